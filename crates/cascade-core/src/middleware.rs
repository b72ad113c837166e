//! The middleware chain executor.
//!
//! A chain is an ordered list of [`Middleware`] plus a terminal continuation.
//! Each middleware receives a [`Next`] handle; awaiting it runs the rest of
//! the chain and resolves once everything downstream has settled, so
//! middleware nest like an onion:
//!
//! ```text
//! A-enter → B-enter → terminal → B-exit → A-exit
//! ```
//!
//! A middleware that never calls `next()` halts the chain. Errors are not
//! caught here: they travel back up through every pending `next()` until a
//! middleware handles them or the chain returns them to its caller.
//!
//! The cursor guarding against repeated `next()` calls lives in a state
//! object created per run, so one middleware list can be executed for any
//! number of events at the same time.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::trace;

use crate::args::MiddlewareArgs;
use crate::error::{BoxError, CascadeError};

/// What a middleware resolves to.
pub type MiddlewareResult = Result<(), BoxError>;

/// One step of a chain.
///
/// Implemented for every `Fn(MiddlewareArgs) -> impl Future<Output = MiddlewareResult>`.
///
/// ```rust,ignore
/// let log = |args: MiddlewareArgs| async move {
///     tracing::info!(category = %args.category, "before");
///     args.next().await?;
///     tracing::info!("after");
///     Ok::<(), BoxError>(())
/// };
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, args: MiddlewareArgs) -> BoxFuture<'static, MiddlewareResult>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(MiddlewareArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    fn call(&self, args: MiddlewareArgs) -> BoxFuture<'static, MiddlewareResult> {
        Box::pin(self(args))
    }
}

/// A type-erased middleware.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Boxes a middleware.
pub fn into_middleware<M: Middleware>(middleware: M) -> BoxedMiddleware {
    Arc::new(middleware)
}

type Terminal = Box<dyn FnOnce() -> BoxFuture<'static, MiddlewareResult> + Send>;

struct ChainState {
    middleware: Arc<[BoxedMiddleware]>,
    /// Number of entries of `middleware` run as ordinary steps.
    len: usize,
    args: MiddlewareArgs,
    last_invoked: Mutex<Option<usize>>,
    terminal: Mutex<Option<Terminal>>,
}

/// Continuation into the remainder of a chain.
///
/// Cloning a `Next` does not create a second continuation: every clone
/// shares the chain's cursor, and the second invocation of the same
/// position fails with [`CascadeError::MultipleNextInvocation`].
#[derive(Clone)]
pub struct Next {
    state: Arc<ChainState>,
    index: usize,
}

impl Next {
    /// Runs the rest of the chain.
    pub fn run(&self) -> BoxFuture<'static, MiddlewareResult> {
        invoke(Arc::clone(&self.state), self.index)
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").field("index", &self.index).finish()
    }
}

fn invoke(state: Arc<ChainState>, index: usize) -> BoxFuture<'static, MiddlewareResult> {
    Box::pin(async move {
        {
            let mut last = state.last_invoked.lock();
            if last.is_some_and(|prev| index <= prev) {
                return Err(CascadeError::MultipleNextInvocation {
                    index: index.saturating_sub(1),
                }
                .into());
            }
            *last = Some(index);
        }

        if index < state.len {
            trace!(index, "Invoking middleware");
            let mut args = state.args.clone();
            args.next = Some(Next {
                state: Arc::clone(&state),
                index: index + 1,
            });
            let middleware = Arc::clone(&state.middleware[index]);
            middleware.call(args).await
        } else {
            let terminal = state.terminal.lock().take();
            match terminal {
                Some(terminal) => {
                    trace!("Chain exhausted, invoking terminal");
                    terminal().await
                }
                None => Ok(()),
            }
        }
    })
}

/// Runs `middleware` in order, then `terminal` if every step called `next()`.
pub async fn run_middleware_chain<T, Fut>(
    middleware: Arc<[BoxedMiddleware]>,
    args: MiddlewareArgs,
    terminal: T,
) -> MiddlewareResult
where
    T: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    let len = middleware.len();
    let terminal: Terminal =
        Box::new(move || Box::pin(terminal()) as BoxFuture<'static, MiddlewareResult>);
    run(middleware, len, args, terminal).await
}

/// Runs a chain whose last entry is its own terminal.
///
/// All entries but the last run as ordinary steps; the last one is invoked
/// with `next` absent once the others have all continued. An empty list
/// does nothing.
pub async fn run_final_callback_chain(
    middleware: Arc<[BoxedMiddleware]>,
    args: MiddlewareArgs,
) -> MiddlewareResult {
    let Some(last) = middleware.last().cloned() else {
        return Ok(());
    };
    let len = middleware.len() - 1;
    let mut final_args = args.clone();
    final_args.next = None;
    let terminal: Terminal = Box::new(move || last.call(final_args));
    run(middleware, len, args, terminal).await
}

async fn run(
    middleware: Arc<[BoxedMiddleware]>,
    len: usize,
    mut args: MiddlewareArgs,
    terminal: Terminal,
) -> MiddlewareResult {
    args.next = None;
    let state = Arc::new(ChainState {
        middleware,
        len,
        args,
        last_invoked: Mutex::new(None),
        terminal: Mutex::new(Some(terminal)),
    });
    invoke(state, 0).await
}
