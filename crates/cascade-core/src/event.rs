//! Event classification for untyped platform payloads.
//!
//! Incoming bodies carry no single discriminant field, so the category is
//! found by walking an ordered rule table and taking the first rule whose
//! shape predicate holds:
//!
//! ```text
//! function_executed event → Event → Command → Options → Action
//!     → Shortcut (global) → Shortcut (message) → ViewAction → unrecognized
//! ```
//!
//! Classification never mutates the body; it derives a parallel
//! [`Classification`] value. Calling [`classify`] twice on the same body
//! yields the same result.

use serde_json::Value;

// ============================================================================
// Event Category
// ============================================================================

/// The high-level category of an incoming body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Events API callback (`body.event` present).
    Event,
    /// Slash command invocation.
    Command,
    /// External select / block suggestion request.
    Options,
    /// Block actions, dialog submissions, legacy step edits.
    Action,
    /// Global or message shortcut.
    Shortcut,
    /// View submission or view closed.
    ViewAction,
    /// A `function_executed` event for a custom function.
    FunctionExecution,
}

impl EventCategory {
    /// Returns the category name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Command => "command",
            Self::Options => "options",
            Self::Action => "action",
            Self::Shortcut => "shortcut",
            Self::ViewAction => "view_action",
            Self::FunctionExecution => "function_execution",
        }
    }

    /// Event-shaped bodies are acknowledged by the dispatcher before any
    /// middleware runs; everything else waits for an explicit `ack()`.
    pub fn is_auto_acknowledged(&self) -> bool {
        matches!(self, Self::Event | Self::FunctionExecution)
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of classifying a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Category of the body.
    pub category: EventCategory,
    /// Conversation the body belongs to, when it has one.
    pub conversation_id: Option<String>,
}

// ============================================================================
// Rule Table
// ============================================================================

struct Rule {
    category: EventCategory,
    matches: fn(&Value) -> bool,
    conversation: fn(&Value) -> Option<String>,
}

const RULES: &[Rule] = &[
    Rule {
        category: EventCategory::FunctionExecution,
        matches: |b| event_type(b) == Some("function_executed"),
        conversation: event_conversation,
    },
    Rule {
        category: EventCategory::Event,
        matches: |b| has(b, "event"),
        conversation: event_conversation,
    },
    Rule {
        category: EventCategory::Command,
        matches: |b| has(b, "command"),
        conversation: |b| string_at(b, &["channel_id"]),
    },
    Rule {
        category: EventCategory::Options,
        matches: |b| has(b, "name") || body_type(b) == Some("block_suggestion"),
        conversation: |b| string_at(b, &["channel", "id"]),
    },
    Rule {
        category: EventCategory::Action,
        matches: |b| {
            has(b, "actions")
                || matches!(
                    body_type(b),
                    Some("dialog_submission" | "dialog_cancellation" | "workflow_step_edit")
                )
        },
        conversation: |b| string_at(b, &["channel", "id"]),
    },
    Rule {
        category: EventCategory::Shortcut,
        matches: |b| body_type(b) == Some("shortcut"),
        conversation: |_| None,
    },
    Rule {
        category: EventCategory::Shortcut,
        matches: |b| body_type(b) == Some("message_action"),
        conversation: |b| string_at(b, &["channel", "id"]),
    },
    Rule {
        category: EventCategory::ViewAction,
        matches: |b| matches!(body_type(b), Some("view_submission" | "view_closed")),
        conversation: |_| None,
    },
];

/// Classifies a body, returning `None` when no known shape matches.
pub fn classify(body: &Value) -> Option<Classification> {
    let rule = RULES.iter().find(|rule| (rule.matches)(body))?;
    Some(Classification {
        category: rule.category,
        conversation_id: (rule.conversation)(body),
    })
}

/// Selects the category-specific payload out of a body.
///
/// Events yield `body.event`, view actions yield `body.view`, actions yield
/// the first entry of `body.actions` when there is one; all other
/// categories use the body itself.
pub fn payload_for(category: EventCategory, body: &Value) -> Value {
    let selected = match category {
        EventCategory::Event | EventCategory::FunctionExecution => body.get("event"),
        EventCategory::ViewAction => body.get("view"),
        EventCategory::Action => body
            .get("actions")
            .and_then(Value::as_array)
            .and_then(|actions| actions.first()),
        _ => None,
    };
    selected.cloned().unwrap_or_else(|| body.clone())
}

/// Returns `body.event.type`, if present.
pub fn event_type(body: &Value) -> Option<&str> {
    body.get("event")?.get("type")?.as_str()
}

// ============================================================================
// Helpers
// ============================================================================

fn has(body: &Value, key: &str) -> bool {
    body.get(key).is_some_and(|v| !v.is_null())
}

fn body_type(body: &Value) -> Option<&str> {
    body.get("type")?.as_str()
}

/// Walks `path` from `value` and returns the string found there.
pub(crate) fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))?
        .as_str()
        .map(str::to_string)
}

/// Conversation of an event: `channel` (string or `{id}`), then
/// `channel_id`, then `item.channel`.
fn event_conversation(body: &Value) -> Option<String> {
    let event = body.get("event")?;
    let channel = match event.get("channel") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(other) => string_at(other, &["id"]),
        None => None,
    };
    channel
        .or_else(|| string_at(event, &["channel_id"]))
        .or_else(|| string_at(event, &["item", "channel"]))
}
