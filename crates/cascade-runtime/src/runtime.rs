//! The event loop.
//!
//! [`CascadeRuntime`] owns a frozen [`App`] and feeds it inbound events. Each
//! event is dispatched on its own task, so distinct events interleave while
//! every single dispatch stays sequential.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use cascade_runtime::CascadeRuntime;
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! let runtime = CascadeRuntime::builder()
//!     .profile("production")
//!     .build_with(|app| app.listener(on_message().handler(echo)))?;
//!
//! // A receiver pushes `ReceiverEvent`s into `tx`.
//! runtime.run(rx).await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::future::BoxFuture;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cascade_core::{CascadeResult, ReceiverEvent};
use cascade_framework::{App, AppBuilder};

use crate::config::{CascadeConfig, ConfigLoader};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Counters for dispatches started by the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Dispatches that have finished.
    pub dispatched: u64,
    /// Finished dispatches whose error the handler did not recover.
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn record(&self, result: &CascadeResult<()>) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = result {
            self.failed.fetch_add(1, Ordering::Relaxed);
            debug!(code = %err.code(), "Dispatch returned an error");
        }
    }
}

/// Dispatches inbound events until shutdown.
pub struct CascadeRuntime {
    app: App,
    config: CascadeConfig,
    shutdown: CancellationToken,
    running: AtomicBool,
    counters: Arc<Counters>,
}

impl CascadeRuntime {
    /// Creates a runtime for `app` and initializes logging from `config`.
    pub fn new(app: App, config: CascadeConfig) -> Self {
        logging::init_from_config(&config.logging);
        info!(
            log_level = %config.logging.level,
            middleware = app.middleware_count(),
            listeners = app.listener_count(),
            "Runtime initialized"
        );
        Self {
            app,
            config,
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
            counters: Arc::default(),
        }
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Dispatches one event on its own task.
    pub fn handle(&self, event: ReceiverEvent) -> JoinHandle<CascadeResult<()>> {
        tokio::spawn(self.dispatch_task(event))
    }

    fn dispatch_task(&self, event: ReceiverEvent) -> BoxFuture<'static, CascadeResult<()>> {
        let app = self.app.clone();
        let counters = Arc::clone(&self.counters);
        Box::pin(async move {
            let result = app.dispatch(event).await;
            counters.record(&result);
            result
        })
    }

    /// Requests a graceful shutdown of [`run`](Self::run).
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Returns a token that stops the runtime when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Consumes events from `rx` until Ctrl+C, [`shutdown`](Self::shutdown),
    /// or the channel closing, then waits for in-flight dispatches.
    pub async fn run(&self, mut rx: mpsc::Receiver<ReceiverEvent>) -> RuntimeResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }

        let token = self.shutdown.clone();
        let signals = tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, shutting down");
                    token.cancel();
                }
                Err(err) => error!(error = %err, "Failed to listen for Ctrl+C"),
            }
        });

        info!("Cascade runtime is now running. Press Ctrl+C to stop.");
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => {
                        tasks.spawn(self.dispatch_task(event));
                    }
                    None => {
                        debug!("Event channel closed");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_panic(joined);
                }
            }
        }

        signals.abort();
        self.drain(tasks).await;
        self.running.store(false, Ordering::SeqCst);
        info!("Runtime stopped");
        Ok(())
    }

    async fn drain(&self, mut tasks: JoinSet<CascadeResult<()>>) {
        if tasks.is_empty() {
            return;
        }
        info!(in_flight = tasks.len(), "Waiting for in-flight dispatches");

        let timeout = self.config.runtime.drain_timeout();
        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = tasks.join_next().await {
                log_panic(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                timeout_ms = timeout.as_millis() as u64,
                "In-flight dispatches did not finish in time, aborting"
            );
            tasks.abort_all();
        }
    }
}

fn log_panic(joined: Result<CascadeResult<()>, tokio::task::JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            error!(error = %err, "A dispatch task panicked");
        }
    }
}

impl std::fmt::Debug for CascadeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeRuntime")
            .field("app", &self.app)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration and builds the app from its settings.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: CascadeConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and lets `register` populate an app builder
    /// seeded with the loaded `app` settings.
    pub fn build_with<F>(self, register: F) -> RuntimeResult<CascadeRuntime>
    where
        F: FnOnce(AppBuilder) -> AppBuilder,
    {
        let config = self.config_loader.load()?;
        let app = register(AppBuilder::from_settings(config.app.clone())).build();
        Ok(CascadeRuntime::new(app, config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::{BoxError, MiddlewareArgs};
    use cascade_framework::{Listener, on_message};
    use serde_json::json;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn message(text: &str) -> ReceiverEvent {
        ReceiverEvent::new(json!({ "event": { "type": "message", "channel": "C1", "text": text } }))
    }

    fn runtime(app: AppBuilder) -> CascadeRuntime {
        CascadeRuntime::new(app.build(), CascadeConfig::default())
    }

    fn counting(counter: &Arc<AtomicU64>) -> Listener {
        let counter = counter.clone();
        on_message().handler(move |_args: MiddlewareArgs| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        })
    }

    #[tokio::test]
    async fn test_run_until_channel_closes() {
        let counter = Arc::new(AtomicU64::new(0));
        let runtime = runtime(App::builder().listener(counting(&counter)));

        let (tx, rx) = mpsc::channel(8);
        for text in ["one", "two", "three"] {
            tx.send(message(text)).await.unwrap();
        }
        drop(tx);

        assert_ok!(runtime.run(rx).await);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(runtime.stats(), RuntimeStats { dispatched: 3, failed: 0 });
        assert!(!runtime.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_in_flight() {
        let finished = Arc::new(AtomicU64::new(0));
        let counter = finished.clone();
        let runtime = Arc::new(runtime(App::builder().listener(on_message().handler(
            move |_args: MiddlewareArgs| {
                let counter = counter.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), BoxError>(())
                }
            },
        ))));

        let (tx, rx) = mpsc::channel(8);
        let running = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run(rx).await }
        });

        tx.send(message("slow")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        runtime.shutdown();

        assert_ok!(running.await.unwrap());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let runtime = runtime(App::builder().listener(on_message().handler(
            |_args: MiddlewareArgs| async { Err::<(), BoxError>("boom".into()) },
        )));

        let result = runtime.handle(message("hi")).await.unwrap();
        assert_err!(result);
        assert_eq!(runtime.stats(), RuntimeStats { dispatched: 1, failed: 1 });
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let runtime = Arc::new(runtime(App::builder()));
        let (_tx, rx) = mpsc::channel(1);
        let first = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run(rx).await }
        });
        while !runtime.is_running() {
            tokio::task::yield_now().await;
        }

        let (_tx2, rx2) = mpsc::channel(1);
        assert!(matches!(runtime.run(rx2).await, Err(RuntimeError::AlreadyRunning)));

        runtime.shutdown();
        assert_ok!(first.await.unwrap());
    }

    #[test]
    fn test_builder_applies_app_settings() {
        let mut config = CascadeConfig::default();
        config.app.ignore_self = false;
        config.app.ack_timeout_ms = 1500;

        let runtime = CascadeRuntime::builder()
            .search_path("/nonexistent")
            .without_env()
            .merge(config)
            .build_with(|app| app.listener(Listener::new()))
            .unwrap();

        assert_eq!(runtime.app().settings().ack_timeout_ms, 1500);
        assert_eq!(runtime.app().middleware_count(), 0);
        assert_eq!(runtime.app().listener_count(), 1);
    }
}
