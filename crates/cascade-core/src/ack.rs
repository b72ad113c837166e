//! Exactly-once acknowledgment.
//!
//! Every inbound event carries an acknowledgment function supplied by the
//! receiver. [`Ack`] wraps it so that the second call fails with
//! [`CascadeError::MultipleAck`] instead of reaching the transport twice, and
//! so that a forgotten acknowledgment is reported after a bounded delay.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, trace, warn};

use crate::error::{BoxError, CascadeError};

/// Default delay before an unacknowledged event is reported.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(3000);

/// The receiver-supplied acknowledgment function.
pub type AckFn =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

struct AckInner {
    func: AckFn,
    acked: AtomicBool,
    acked_signal: Notify,
}

/// A shared, single-use acknowledgment handle.
///
/// Clones refer to the same underlying state, so acknowledging through any
/// clone consumes the handle for all of them.
#[derive(Clone)]
pub struct Ack {
    inner: Arc<AckInner>,
}

impl Ack {
    /// Wraps a receiver acknowledgment function.
    pub fn new(func: AckFn) -> Self {
        Self {
            inner: Arc::new(AckInner {
                func,
                acked: AtomicBool::new(false),
                acked_signal: Notify::new(),
            }),
        }
    }

    /// Wraps an async closure as an acknowledgment function.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self::new(ack_fn(f))
    }

    /// An acknowledgment that does nothing beyond enforcing the single-use rule.
    pub fn noop() -> Self {
        Self::new(noop_ack_fn())
    }

    /// Acknowledges without a response body.
    pub async fn ack(&self) -> Result<(), BoxError> {
        self.call(None).await
    }

    /// Acknowledges with an optional response body.
    ///
    /// Fails with [`CascadeError::MultipleAck`] on every call after the first.
    pub async fn call(&self, response: Option<Value>) -> Result<(), BoxError> {
        if self.inner.acked.swap(true, Ordering::SeqCst) {
            return Err(CascadeError::MultipleAck.into());
        }
        self.inner.acked_signal.notify_one();
        trace!("Acknowledging event");
        (self.inner.func)(response).await
    }

    /// Returns `true` once the event has been acknowledged.
    pub fn is_acked(&self) -> bool {
        self.inner.acked.load(Ordering::SeqCst)
    }

    /// Spawns a timer that warns if the event is still unacknowledged after `timeout`.
    ///
    /// The timer ends as soon as the event is acknowledged and never cancels
    /// in-flight middleware. The warning is logged inside the caller's span.
    pub fn watch(&self, timeout: Duration, category: &'static str) -> JoinHandle<()> {
        let ack = self.clone();
        let timer = async move {
            let acked = ack.inner.acked_signal.notified();
            if tokio::time::timeout(timeout, acked).await.is_err() && !ack.is_acked() {
                warn!(
                    category,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "An incoming event was not acknowledged in time"
                );
            }
        };
        tokio::spawn(timer.instrument(Span::current()))
    }
}

impl std::fmt::Debug for Ack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ack")
            .field("acked", &self.is_acked())
            .finish()
    }
}

/// Boxes an async closure into an [`AckFn`].
pub fn ack_fn<F, Fut>(f: F) -> AckFn
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |response| Box::pin(f(response)) as BoxFuture<'static, _>)
}

/// An [`AckFn`] that succeeds without doing anything.
pub fn noop_ack_fn() -> AckFn {
    Arc::new(|_| Box::pin(async { Ok(()) }) as BoxFuture<'static, _>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_second_ack_fails() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ack = Ack::from_fn(move |response| {
            let sink = sink.clone();
            async move {
                sink.lock().push(response);
                Ok::<(), BoxError>(())
            }
        });

        assert!(!ack.is_acked());
        assert_ok!(ack.call(Some(json!({ "text": "ok" }))).await);
        assert!(ack.is_acked());

        let err = assert_err!(ack.clone().ack().await);
        let err = CascadeError::from_boxed(err);
        assert_eq!(err.code(), ErrorCode::MultipleAck);

        assert_eq!(*seen.lock(), vec![Some(json!({ "text": "ok" }))]);
    }

    /// Collects formatted log output written by a test subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_ends_when_acknowledged() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let ack = Ack::noop();
        let start = tokio::time::Instant::now();
        let timer = ack.watch(Duration::from_secs(3), "action");
        assert_ok!(ack.ack().await);
        assert_ok!(timer.await);

        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!logs.contents().contains("not acknowledged"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_warns_when_never_acknowledged() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let ack = Ack::noop();
        let start = tokio::time::Instant::now();
        let timer = ack.watch(Duration::from_millis(50), "command");
        assert_ok!(timer.await);

        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(!ack.is_acked());
        let output = logs.contents();
        assert!(output.contains("An incoming event was not acknowledged in time"));
        assert!(output.contains("category=\"command\""));
        assert!(output.contains("timeout_ms=50"));
    }
}
