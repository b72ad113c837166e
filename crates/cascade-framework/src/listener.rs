//! Listener groups.
//!
//! A [`Listener`] is an ordered middleware chain of the form
//! `[filter..., handler...]`. Filters decide whether the event belongs to
//! the group; handlers do the work. Every registered listener is tried
//! against every dispatched event, and there is no first-match-wins rule.
//!
//! # Tower Service Integration
//!
//! `Listener` implements `tower::Service<MiddlewareArgs>`, so tower layers
//! can wrap a group:
//!
//! ```rust,ignore
//! use tower::ServiceExt;
//!
//! let listener = on_command("/deploy").handler(deploy);
//! listener.oneshot(args).await?;
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::Service;
use tracing::trace;

use cascade_core::{
    BoxError, BoxedMiddleware, Middleware, MiddlewareArgs, MiddlewareResult, into_middleware,
    run_middleware_chain,
};

/// An ordered, immutable-once-registered middleware chain.
///
/// Cloning is cheap: the chain is shared.
#[derive(Clone, Default)]
pub struct Listener {
    name: Option<Arc<str>>,
    filter_count: usize,
    middleware: Arc<[BoxedMiddleware]>,
}

impl Listener {
    /// Creates an empty listener. With no filters it accepts every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into().into());
        self
    }

    fn insert(&mut self, at: usize, middleware: BoxedMiddleware) {
        let mut chain = self.middleware.to_vec();
        chain.insert(at, middleware);
        self.middleware = chain.into();
    }

    /// Appends a filter. Filters always run before handlers.
    pub fn filter<M: Middleware>(self, filter: M) -> Self {
        self.filter_boxed(into_middleware(filter))
    }

    pub fn filter_boxed(mut self, filter: BoxedMiddleware) -> Self {
        let at = self.filter_count;
        self.insert(at, filter);
        self.filter_count += 1;
        self
    }

    /// Appends a handler.
    pub fn handler<M: Middleware>(self, handler: M) -> Self {
        self.handler_boxed(into_middleware(handler))
    }

    pub fn handler_boxed(mut self, handler: BoxedMiddleware) -> Self {
        let at = self.middleware.len();
        self.insert(at, handler);
        self
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn filter_count(&self) -> usize {
        self.filter_count
    }

    /// Returns the number of handlers.
    pub fn handler_count(&self) -> usize {
        self.middleware.len() - self.filter_count
    }

    /// Runs the chain against `args`.
    ///
    /// Resolves `Ok` both when the handlers ran and when a filter stopped
    /// the chain.
    pub async fn execute(&self, args: MiddlewareArgs) -> MiddlewareResult {
        trace!(
            listener = self.get_name().unwrap_or("unnamed"),
            middleware_count = self.middleware.len(),
            "Running listener"
        );
        run_middleware_chain(Arc::clone(&self.middleware), args, || async {
            Ok::<(), BoxError>(())
        })
        .await
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("filter_count", &self.filter_count)
            .field("handler_count", &self.handler_count())
            .finish()
    }
}

impl Service<MiddlewareArgs> for Listener {
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, args: MiddlewareArgs) -> Self::Future {
        let listener = self.clone();
        Box::pin(async move { listener.execute(args).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::{BoundClient, Context as DispatchContext, EventCategory, UnconfiguredClient};
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio_test::assert_ok;
    use tower::ServiceExt;

    fn args() -> MiddlewareArgs {
        MiddlewareArgs::new(
            json!({ "command": "/deploy" }),
            EventCategory::Command,
            DispatchContext::new(),
            BoundClient::new(Arc::new(UnconfiguredClient), None),
        )
    }

    fn step(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str, cont: bool) -> impl Middleware {
        let log = log.clone();
        move |args: MiddlewareArgs| {
            let log = log.clone();
            async move {
                log.lock().push(name);
                if cont {
                    args.next().await?;
                }
                Ok::<(), BoxError>(())
            }
        }
    }

    #[tokio::test]
    async fn test_filters_run_before_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener = Listener::new()
            .name("deploy")
            .handler(step(&log, "h1", true))
            .filter(step(&log, "f1", true))
            .handler(step(&log, "h2", true))
            .filter(step(&log, "f2", true));

        assert_eq!(listener.filter_count(), 2);
        assert_eq!(listener.handler_count(), 2);
        assert_ok!(listener.oneshot(args()).await);
        assert_eq!(*log.lock(), vec!["f1", "f2", "h1", "h2"]);
    }

    #[tokio::test]
    async fn test_rejecting_filter_skips_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener = Listener::new()
            .filter(step(&log, "reject", false))
            .handler(step(&log, "handler", true));

        assert_ok!(listener.execute(args()).await);
        assert_eq!(*log.lock(), vec!["reject"]);
    }
}
