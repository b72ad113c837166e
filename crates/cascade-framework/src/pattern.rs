//! String-or-regex patterns used by the constraint middleware.

use regex::Regex;

/// A constraint value: a literal string or a regular expression.
#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(String),
    Regex(Regex),
}

/// The outcome of a successful pattern test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternMatch {
    /// A literal matched; there is nothing to capture.
    Literal,
    /// A regex matched; index 0 is the whole match.
    Captures(Vec<Option<String>>),
}

impl Pattern {
    /// Tests the whole of `text`: literals compare for equality.
    pub fn match_exact(&self, text: &str) -> Option<PatternMatch> {
        match self {
            Self::Literal(literal) => (literal == text).then_some(PatternMatch::Literal),
            Self::Regex(regex) => captures(regex, text),
        }
    }

    /// Tests anywhere inside `text`: literals match as substrings.
    pub fn match_within(&self, text: &str) -> Option<PatternMatch> {
        match self {
            Self::Literal(literal) => text.contains(literal.as_str()).then_some(PatternMatch::Literal),
            Self::Regex(regex) => captures(regex, text),
        }
    }

    /// Equality for literals, a regex test for patterns; captures are dropped.
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == text,
            Self::Regex(regex) => regex.is_match(text),
        }
    }
}

fn captures(regex: &Regex, text: &str) -> Option<PatternMatch> {
    let caps = regex.captures(text)?;
    let groups = caps
        .iter()
        .map(|group| group.map(|m| m.as_str().to_string()))
        .collect();
    Some(PatternMatch::Captures(groups))
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl From<String> for Pattern {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

impl From<Regex> for Pattern {
    fn from(value: Regex) -> Self {
        Self::Regex(value)
    }
}
