//! The single top-level error sink.
//!
//! Every error that escapes a dispatch reaches exactly one [`ErrorHandler`],
//! once, already normalised to a [`CascadeError`]. The handler either
//! recovers (`Ok(())`) or hands an error back to the caller of `dispatch`.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::error;

use cascade_core::{CascadeError, CascadeResult, Context};

/// The argument bundle of an extended error handler.
#[derive(Debug)]
pub struct ExtendedErrorArgs {
    pub error: CascadeError,
    /// Body of the event whose dispatch failed.
    pub body: Arc<Value>,
    /// Context of the failed dispatch. Empty when authorization failed.
    pub context: Context,
}

type BasicFn = dyn Fn(CascadeError) -> BoxFuture<'static, CascadeResult<()>> + Send + Sync;
type ExtendedFn = dyn Fn(ExtendedErrorArgs) -> BoxFuture<'static, CascadeResult<()>> + Send + Sync;

/// A registered error handler, in one of two forms.
#[derive(Clone)]
pub enum ErrorHandler {
    /// Receives only the error.
    Basic(Arc<BasicFn>),
    /// Receives the error together with the event body and context.
    Extended(Arc<ExtendedFn>),
}

impl ErrorHandler {
    pub fn basic<F, Fut>(f: F) -> Self
    where
        F: Fn(CascadeError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CascadeResult<()>> + Send + 'static,
    {
        Self::Basic(Arc::new(move |error| Box::pin(f(error)) as BoxFuture<'static, _>))
    }

    pub fn extended<F, Fut>(f: F) -> Self
    where
        F: Fn(ExtendedErrorArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CascadeResult<()>> + Send + 'static,
    {
        Self::Extended(Arc::new(move |args| Box::pin(f(args)) as BoxFuture<'static, _>))
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, Self::Extended(_))
    }

    pub(crate) async fn handle(
        &self,
        error: CascadeError,
        body: Arc<Value>,
        context: Context,
    ) -> CascadeResult<()> {
        match self {
            Self::Basic(f) => f(error).await,
            Self::Extended(f) => {
                f(ExtendedErrorArgs {
                    error,
                    body,
                    context,
                })
                .await
            }
        }
    }
}

impl Default for ErrorHandler {
    /// Logs the error and returns it to the caller.
    fn default() -> Self {
        Self::basic(log_and_return)
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic(_) => f.write_str("ErrorHandler::Basic"),
            Self::Extended(_) => f.write_str("ErrorHandler::Extended"),
        }
    }
}

async fn log_and_return(err: CascadeError) -> CascadeResult<()> {
    error!(code = %err.code(), error = %err, "An unhandled error occurred while processing an event");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::ErrorCode;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_default_handler_returns_error() {
        let handler = ErrorHandler::default();
        assert!(!handler.is_extended());
        let err = assert_err!(
            handler
                .handle(CascadeError::MultipleAck, Arc::new(json!({})), Context::new())
                .await
        );
        assert_eq!(err.code(), ErrorCode::MultipleAck);
    }

    #[tokio::test]
    async fn test_extended_handler_sees_body_and_context() {
        let handler = ErrorHandler::extended(|args: ExtendedErrorArgs| async move {
            assert_eq!(args.body["command"], "/deploy");
            assert_eq!(args.context.get_str("team").as_deref(), Some("T1"));
            assert_eq!(args.error.code(), ErrorCode::Unknown);
            Ok::<(), CascadeError>(())
        });
        let ctx = Context::new();
        ctx.insert("team", "T1");
        let err = CascadeError::from_boxed("boom".into());
        assert_ok!(
            handler
                .handle(err, Arc::new(json!({ "command": "/deploy" })), ctx)
                .await
        );
    }
}
