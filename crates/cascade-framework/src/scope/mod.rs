//! Scoped sub-dispatchers.
//!
//! A scope claims a subset of events from the global chain and runs them
//! through its own private middleware list instead. Assistants, custom
//! functions and workflow steps are all scopes; they differ only in which
//! events they claim and which utilities they attach.
//!
//! A [`ScopedDispatcher`] is installed as ordinary global middleware. For
//! every event it:
//!
//! 1. asks the scope for the sub-event kind (primary predicate)
//! 2. checks the scope's structural constraints (secondary predicate)
//! 3. on a miss, calls `next()` and leaves the event untouched
//! 4. on a hit, removes `next`, attaches the scope's utilities and runs the
//!    private list with its last entry as the terminal
//!
//! A claimed event never reaches later global middleware or any listener.

pub mod assistant;
pub mod function;
pub mod thread_context;
pub mod workflow_step;

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, trace};

use cascade_core::{
    BoxedMiddleware, CascadeResult, MiddlewareArgs, MiddlewareResult, into_middleware,
    run_final_callback_chain,
};

/// A family of events handled by a private middleware list.
pub trait Scope: Send + Sync + 'static {
    /// The sub-event kinds this scope distinguishes.
    type Kind: Copy + Debug + Send + Sync + 'static;

    /// Name used in logs and initialization errors.
    const NAME: &'static str;

    /// Returns the sub-event kind if the event belongs to this scope.
    fn sub_event(&self, args: &MiddlewareArgs) -> Option<Self::Kind>;

    /// Structural checks on top of the kind, e.g. an identifier match.
    fn matches_constraints(&self, _kind: Self::Kind, _args: &MiddlewareArgs) -> bool {
        true
    }

    /// The private list for `kind`.
    fn middleware(&self, kind: Self::Kind) -> Arc<[BoxedMiddleware]>;

    /// Attaches the scope's utilities to a claimed event.
    fn augment(&self, kind: Self::Kind, args: &mut MiddlewareArgs) -> CascadeResult<()>;
}

/// Installs a [`Scope`] into the global chain.
pub struct ScopedDispatcher<S> {
    scope: Arc<S>,
}

impl<S: Scope> ScopedDispatcher<S> {
    pub fn new(scope: S) -> Self {
        Self {
            scope: Arc::new(scope),
        }
    }

    /// Claims or passes on one event.
    pub async fn process(&self, mut args: MiddlewareArgs) -> MiddlewareResult {
        let scope = &self.scope;
        let claimed = scope
            .sub_event(&args)
            .filter(|kind| scope.matches_constraints(*kind, &args));

        let Some(kind) = claimed else {
            trace!(scope = S::NAME, "Event not claimed, continuing");
            return args.next().await;
        };

        debug!(scope = S::NAME, ?kind, "Event claimed by scope");
        args.next = None;
        scope.augment(kind, &mut args)?;
        run_final_callback_chain(scope.middleware(kind), args).await
    }

    /// Boxes this dispatcher as global middleware.
    pub fn into_middleware(self) -> BoxedMiddleware {
        let dispatcher = Arc::new(self);
        into_middleware(move |args: MiddlewareArgs| {
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.process(args).await }
        })
    }
}

/// Freezes a registration list.
pub(crate) fn freeze(list: Vec<BoxedMiddleware>) -> Arc<[BoxedMiddleware]> {
    list.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::{
        BoundClient, BoxError, Context, EventCategory, UnconfiguredClient, run_middleware_chain,
    };
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Claims `reaction_added` events whose reaction is `eyes`.
    struct Reactions {
        list: Arc<[BoxedMiddleware]>,
    }

    impl Scope for Reactions {
        type Kind = ();
        const NAME: &'static str = "reactions";

        fn sub_event(&self, args: &MiddlewareArgs) -> Option<()> {
            (args.payload_type() == Some("reaction_added")).then_some(())
        }

        fn matches_constraints(&self, _kind: (), args: &MiddlewareArgs) -> bool {
            args.payload["reaction"] == "eyes"
        }

        fn middleware(&self, _kind: ()) -> Arc<[BoxedMiddleware]> {
            Arc::clone(&self.list)
        }

        fn augment(&self, _kind: (), args: &mut MiddlewareArgs) -> CascadeResult<()> {
            args.context.insert("augmented", true);
            Ok(())
        }
    }

    fn args(reaction: &str) -> MiddlewareArgs {
        MiddlewareArgs::new(
            json!({ "event": { "type": "reaction_added", "reaction": reaction } }),
            EventCategory::Event,
            Context::new(),
            BoundClient::new(Arc::new(UnconfiguredClient), None),
        )
    }

    fn recording(log: &Log, name: &'static str) -> BoxedMiddleware {
        let log = log.clone();
        into_middleware(move |args: MiddlewareArgs| {
            let log = log.clone();
            async move {
                log.lock().push(format!("{name}:next={}", args.next.is_some()));
                args.next().await
            }
        })
    }

    async fn run_global(log: &Log, reaction: &str) -> Value {
        let scope = Reactions {
            list: vec![recording(log, "s1"), recording(log, "s2")].into(),
        };
        let global: Arc<[BoxedMiddleware]> = vec![
            ScopedDispatcher::new(scope).into_middleware(),
            recording(log, "after"),
        ]
        .into();
        let a = args(reaction);
        let ctx = a.context.clone();
        let terminal_log = log.clone();
        run_middleware_chain(global, a, move || async move {
            terminal_log.lock().push("listeners".into());
            Ok::<(), BoxError>(())
        })
        .await
        .unwrap();
        ctx.get("augmented").unwrap_or(Value::Null)
    }

    #[tokio::test]
    async fn test_claimed_event_stays_in_scope() {
        let log = Log::default();
        let augmented = run_global(&log, "eyes").await;
        assert_eq!(augmented, json!(true));
        assert_eq!(*log.lock(), vec!["s1:next=true", "s2:next=false"]);
    }

    #[tokio::test]
    async fn test_unclaimed_event_passes_through() {
        let log = Log::default();
        let augmented = run_global(&log, "tada").await;
        assert_eq!(augmented, Value::Null);
        assert_eq!(*log.lock(), vec!["after:next=true", "listeners"]);
    }
}
