//! Built-in filter middleware.
//!
//! Every filter here follows the same contract: when the event satisfies it
//! the filter awaits `next()`, otherwise it resolves without continuing and
//! the rest of its chain never runs. Regex filters that match store their
//! capture groups in the context under `matches`.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use cascade_core::{CascadeError, EventCategory, Middleware, MiddlewareArgs, MiddlewareResult};

use crate::pattern::{Pattern, PatternMatch};

/// Event types that survive [`ignore_self`] even when the bot caused them.
const SELF_EVENTS_KEPT: &[&str] = &["member_joined_channel", "member_left_channel"];

async fn pass_if(pass: bool, filter: &'static str, args: MiddlewareArgs) -> MiddlewareResult {
    if pass {
        args.next().await
    } else {
        trace!(filter, category = %args.category, "Filter rejected event");
        Ok(())
    }
}

fn text_of(value: &Value) -> Option<&str> {
    value.get("text")?.as_str()
}

// ============================================================================
// Category filters
// ============================================================================

/// Continues only for Events API bodies.
pub fn only_events() -> impl Middleware {
    |args: MiddlewareArgs| {
        let pass = args.event().is_some();
        pass_if(pass, "only_events", args)
    }
}

pub fn only_actions() -> impl Middleware {
    |args: MiddlewareArgs| {
        let pass = args.category == EventCategory::Action;
        pass_if(pass, "only_actions", args)
    }
}

pub fn only_commands() -> impl Middleware {
    |args: MiddlewareArgs| {
        let pass = args.category == EventCategory::Command;
        pass_if(pass, "only_commands", args)
    }
}

pub fn only_options() -> impl Middleware {
    |args: MiddlewareArgs| {
        let pass = args.category == EventCategory::Options;
        pass_if(pass, "only_options", args)
    }
}

pub fn only_shortcuts() -> impl Middleware {
    |args: MiddlewareArgs| {
        let pass = args.category == EventCategory::Shortcut;
        pass_if(pass, "only_shortcuts", args)
    }
}

pub fn only_view_actions() -> impl Middleware {
    |args: MiddlewareArgs| {
        let pass = args.category == EventCategory::ViewAction;
        pass_if(pass, "only_view_actions", args)
    }
}

// ============================================================================
// Value filters
// ============================================================================

/// Continues when `event.type` equals the literal or matches the regex.
pub fn match_event_type(pattern: impl Into<Pattern>) -> impl Middleware {
    let pattern = Arc::new(pattern.into());
    move |args: MiddlewareArgs| {
        let pass = args
            .event()
            .and_then(|event| event.get("type")?.as_str())
            .is_some_and(|t| pattern.is_match(t));
        pass_if(pass, "match_event_type", args)
    }
}

/// Continues when the event text contains the literal or matches the regex.
///
/// Events without text never match.
pub fn match_message(pattern: impl Into<Pattern>) -> impl Middleware {
    let pattern = Arc::new(pattern.into());
    move |args: MiddlewareArgs| {
        let matched = args
            .event()
            .and_then(text_of)
            .and_then(|text| pattern.match_within(text));
        if let Some(PatternMatch::Captures(groups)) = &matched {
            args.context.set_matches(groups.clone());
        }
        pass_if(matched.is_some(), "match_message", args)
    }
}

/// Continues when the slash command name equals the literal or matches the regex.
pub fn match_command_name(pattern: impl Into<Pattern>) -> impl Middleware {
    let pattern = Arc::new(pattern.into());
    move |args: MiddlewareArgs| {
        let pass = args
            .command()
            .and_then(|command| command.get("command")?.as_str())
            .is_some_and(|name| pattern.is_match(name));
        pass_if(pass, "match_command_name", args)
    }
}

/// Continues when `event.subtype` equals `subtype`.
pub fn subtype(subtype: impl Into<String>) -> impl Middleware {
    let subtype: Arc<str> = subtype.into().into();
    move |args: MiddlewareArgs| {
        let pass = args
            .event()
            .and_then(|event| event.get("subtype")?.as_str())
            .is_some_and(|s| s == &*subtype);
        pass_if(pass, "subtype", args)
    }
}

// ============================================================================
// Constraints
// ============================================================================

/// Identifier constraints for interactive payloads.
///
/// Every key that is set must be satisfied. A key whose field is missing
/// from the payload is a non-match.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    pub kind: Option<Pattern>,
    pub block_id: Option<Pattern>,
    pub action_id: Option<Pattern>,
    pub callback_id: Option<Pattern>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrains the body `type`.
    pub fn kind(mut self, pattern: impl Into<Pattern>) -> Self {
        self.kind = Some(pattern.into());
        self
    }

    pub fn block_id(mut self, pattern: impl Into<Pattern>) -> Self {
        self.block_id = Some(pattern.into());
        self
    }

    pub fn action_id(mut self, pattern: impl Into<Pattern>) -> Self {
        self.action_id = Some(pattern.into());
        self
    }

    pub fn callback_id(mut self, pattern: impl Into<Pattern>) -> Self {
        self.callback_id = Some(pattern.into());
        self
    }

    /// Returns `None` on a non-match, otherwise the captures of the last
    /// regex constraint that matched.
    fn evaluate(&self, args: &MiddlewareArgs) -> Option<Option<Vec<Option<String>>>> {
        let mut captured = None;
        let mut check = |pattern: &Option<Pattern>, field: Option<&str>| -> Option<()> {
            let Some(pattern) = pattern else {
                return Some(());
            };
            if let PatternMatch::Captures(groups) = pattern.match_exact(field?)? {
                captured = Some(groups);
            }
            Some(())
        };

        check(&self.block_id, args.payload.get("block_id").and_then(Value::as_str))?;
        check(&self.action_id, args.payload.get("action_id").and_then(Value::as_str))?;
        check(&self.callback_id, callback_id(&args.body))?;
        check(&self.kind, args.body.get("type").and_then(Value::as_str))?;
        Some(captured)
    }
}

/// `view.callback_id` for view bodies, the top-level `callback_id` otherwise.
fn callback_id(body: &Value) -> Option<&str> {
    match body.get("view") {
        Some(view) => view.get("callback_id")?.as_str(),
        None => body.get("callback_id")?.as_str(),
    }
}

/// Continues when every constraint is satisfied by the payload.
pub fn matches_constraints(constraints: Constraints) -> impl Middleware {
    let constraints = Arc::new(constraints);
    move |args: MiddlewareArgs| {
        let outcome = constraints.evaluate(&args);
        if let Some(Some(groups)) = &outcome {
            args.context.set_matches(groups.clone());
        }
        pass_if(outcome.is_some(), "matches_constraints", args)
    }
}

// ============================================================================
// Bot-aware filters
// ============================================================================

/// Continues only for messages that start by mentioning the bot user.
///
/// Fails when the context carries no `bot_user_id`.
pub fn direct_mention() -> impl Middleware {
    direct_mention_filter
}

async fn direct_mention_filter(args: MiddlewareArgs) -> MiddlewareResult {
    let bot_user_id = args
        .context
        .bot_user_id()
        .ok_or(CascadeError::ContextMissingProperty {
            property: "bot_user_id",
        })?;
    let pass = args
        .message()
        .and_then(text_of)
        .and_then(leading_mention)
        .is_some_and(|id| id == bot_user_id);
    pass_if(pass, "direct_mention", args).await
}

/// Extracts the user id of a `<@U123>` or `<@U123|name>` mention at the
/// start of `text`.
fn leading_mention(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("<@")?;
    let (inner, _) = rest.split_once('>')?;
    let id = inner.split('|').next()?;
    (!id.is_empty()).then_some(id)
}

/// Drops events the bot caused itself.
///
/// Messages posted by the bot (`bot_id`) and events whose `user` is the bot
/// user are dropped, except membership events.
pub fn ignore_self() -> impl Middleware {
    |args: MiddlewareArgs| {
        let pass = !is_self_event(&args);
        pass_if(pass, "ignore_self", args)
    }
}

fn is_self_event(args: &MiddlewareArgs) -> bool {
    let Some(event) = args.event() else {
        return false;
    };

    if let (Some(_), Some(bot_id)) = (args.message(), args.context.bot_id()) {
        if event.get("bot_id").and_then(Value::as_str) == Some(bot_id.as_str()) {
            return true;
        }
    }

    let kept = event
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| SELF_EVENTS_KEPT.contains(&t));
    match args.context.bot_user_id() {
        Some(bot_user_id) => {
            !kept && event.get("user").and_then(Value::as_str) == Some(bot_user_id.as_str())
        }
        None => false,
    }
}
