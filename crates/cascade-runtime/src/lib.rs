//! Cascade Runtime - hosting layer for Cascade apps.
//!
//! This crate provides:
//! - The event loop that feeds receiver events into an [`App`](cascade_framework::App)
//!   (`CascadeRuntime`)
//! - Layered configuration (defaults, files, profiles, environment)
//! - Logging configuration
//!
//! ```ignore
//! use cascade_runtime::CascadeRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CascadeRuntime::builder()
//!         .build_with(|app| app.token("xoxb-...").listener(on_message().handler(echo)))?;
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     spawn_receiver(tx);
//!
//!     // Run until Ctrl+C or the receiver hangs up
//!     runtime.run(rx).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{
    CascadeConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig, RuntimeConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{CascadeRuntime, RuntimeBuilder, RuntimeStats};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
