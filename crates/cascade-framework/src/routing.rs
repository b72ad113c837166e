//! Listener builders for common event kinds.
//!
//! Each helper returns a [`Listener`] with the relevant filters already in
//! place. Attach handlers with `.handler(f)`:
//!
//! ```rust,ignore
//! let app = App::builder()
//!     .listener(on_message_matching(":wave:").handler(wave_back))
//!     .listener(on_action(Constraints::new().action_id("approve")).handler(approve))
//!     .build();
//! ```

use crate::constraints::{
    Constraints, match_command_name, match_event_type, match_message, matches_constraints,
    only_actions, only_commands, only_events, only_options, only_shortcuts, only_view_actions,
};
use crate::listener::Listener;
use crate::pattern::Pattern;

/// Events whose `type` equals the literal or matches the regex.
pub fn on_event(event_type: impl Into<Pattern>) -> Listener {
    Listener::new()
        .name("event")
        .filter(only_events())
        .filter(match_event_type(event_type))
}

/// All `message` events.
pub fn on_message() -> Listener {
    Listener::new()
        .name("message")
        .filter(only_events())
        .filter(match_event_type("message"))
}

/// `message` events whose text contains the literal or matches the regex.
pub fn on_message_matching(pattern: impl Into<Pattern>) -> Listener {
    on_message().filter(match_message(pattern))
}

/// Block actions, dialog submissions and other interactive actions.
pub fn on_action(constraints: Constraints) -> Listener {
    Listener::new()
        .name("action")
        .filter(only_actions())
        .filter(matches_constraints(constraints))
}

/// Slash commands whose name equals the literal or matches the regex.
pub fn on_command(name: impl Into<Pattern>) -> Listener {
    Listener::new()
        .name("command")
        .filter(only_commands())
        .filter(match_command_name(name))
}

/// External select option requests.
pub fn on_options(constraints: Constraints) -> Listener {
    Listener::new()
        .name("options")
        .filter(only_options())
        .filter(matches_constraints(constraints))
}

/// Global and message shortcuts.
pub fn on_shortcut(constraints: Constraints) -> Listener {
    Listener::new()
        .name("shortcut")
        .filter(only_shortcuts())
        .filter(matches_constraints(constraints))
}

/// View submissions, or view closures when the constraints ask for them.
///
/// Without a `kind` constraint only `view_submission` matches.
pub fn on_view(mut constraints: Constraints) -> Listener {
    if constraints.kind.is_none() {
        constraints.kind = Some("view_submission".into());
    }
    Listener::new()
        .name("view")
        .filter(only_view_actions())
        .filter(matches_constraints(constraints))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::{BoundClient, BoxError, Context, MiddlewareArgs, UnconfiguredClient, classify};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args_for(body: Value) -> MiddlewareArgs {
        let category = classify(&body).unwrap().category;
        let client = BoundClient::new(Arc::new(UnconfiguredClient), None);
        MiddlewareArgs::new(body, category, Context::new(), client)
    }

    async fn hits(listener: Listener, body: Value) -> usize {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let listener = listener.handler(move |_args: MiddlewareArgs| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });
        listener.execute(args_for(body)).await.unwrap();
        count.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_routes() {
        let wave = json!({ "event": { "type": "message", "text": ":wave:" } });
        assert_eq!(hits(on_message(), wave.clone()).await, 1);
        assert_eq!(hits(on_message_matching(":wave:"), wave.clone()).await, 1);
        assert_eq!(hits(on_message_matching(":tada:"), wave.clone()).await, 0);
        assert_eq!(hits(on_event("message"), wave.clone()).await, 1);
        assert_eq!(hits(on_command("/deploy"), wave).await, 0);

        let command = json!({ "command": "/deploy", "channel_id": "C1" });
        assert_eq!(hits(on_command("/deploy"), command).await, 1);

        let action = json!({ "type": "block_actions", "actions": [{ "action_id": "go" }] });
        assert_eq!(hits(on_action(Constraints::new().action_id("go")), action.clone()).await, 1);
        assert_eq!(hits(on_shortcut(Constraints::new().callback_id("go")), action).await, 0);

        let shortcut = json!({ "type": "shortcut", "callback_id": "open" });
        assert_eq!(hits(on_shortcut(Constraints::new().callback_id("open")), shortcut).await, 1);

        let options = json!({ "type": "block_suggestion", "action_id": "pick" });
        assert_eq!(hits(on_options(Constraints::new().action_id("pick")), options).await, 1);
    }

    #[tokio::test]
    async fn test_on_view_defaults_to_submissions() {
        let closed = json!({ "type": "view_closed", "view": { "callback_id": "survey" } });
        let submitted = json!({ "type": "view_submission", "view": { "callback_id": "survey" } });

        let survey = || Constraints::new().callback_id("survey");
        assert_eq!(hits(on_view(survey()), submitted).await, 1);
        assert_eq!(hits(on_view(survey()), closed.clone()).await, 0);
        assert_eq!(hits(on_view(survey().kind("view_closed")), closed).await, 1);
    }
}
