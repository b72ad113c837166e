//! # Cascade
//!
//! A continuation-based middleware dispatch framework for chat platform
//! events.
//!
//! ## Overview
//!
//! Every inbound event runs through one onion-style chain: global middleware
//! first, then each listener with its own filters and handler. A middleware
//! decides whether the rest of the chain runs by awaiting `next`, and gets
//! control back once downstream work is done.
//!
//! ```text
//! ┌──────────┐    ┌──────────────────────┐    ┌────────────────────────────┐
//! │ Receiver │───▶│ App::dispatch        │───▶│ global middleware (onion)  │
//! │          │    │ classify / authorize │    │   └▶ listener 1 filters ─▶ │
//! └──────────┘    │ context / ack        │    │   └▶ listener 2 filters ─▶ │
//!                 └──────────────────────┘    └────────────────────────────┘
//! ```
//!
//! - **Runtime**: feeds receiver events into the app, one task per event
//! - **App**: classifies, authorizes and builds the per-event arguments
//! - **Scopes**: assistants, custom functions and workflow steps claim their
//!   events and run a private chain
//! - **Error handler**: the single sink for failures of a dispatch
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cascade::prelude::*;
//!
//! async fn echo(args: MiddlewareArgs) -> Result<(), BoxError> {
//!     let text = args.payload["text"].as_str().unwrap_or_default().to_string();
//!     if let Some(say) = &args.say {
//!         say.call(text).await?;
//!     }
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CascadeRuntime::builder()
//!         .build_with(|app| app.token("xoxb-...").listener(on_message().handler(echo)))?;
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     spawn_receiver(tx);
//!     runtime.run(rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use cascade_core as core;
pub use cascade_framework as framework;
pub use cascade_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use cascade::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use cascade_runtime::{CascadeConfig, CascadeRuntime, RuntimeError};

    // Registration and dispatch
    pub use cascade_framework::{
        App, AppBuilder, AppSettings, Assistant, CustomFunction, ErrorHandler, ExtendedErrorArgs,
        Listener, Pattern, WorkflowStep,
    };

    // Routing helpers
    pub use cascade_framework::{
        on_action, on_command, on_event, on_message, on_message_matching, on_options,
        on_shortcut, on_view,
    };

    // Built-in filters
    pub use cascade_framework::{
        direct_mention, ignore_self, match_command_name, match_event_type, match_message,
        only_actions, only_commands, only_events, only_options, only_shortcuts,
        only_view_actions, subtype,
    };

    // Core types
    pub use cascade_core::{
        Authorize, AuthorizeResult, BoxError, CascadeError, CascadeResult, Client, Context,
        ErrorCode, EventCategory, Middleware, MiddlewareArgs, Next, ReceiverEvent,
    };

    // Logging macros
    pub use cascade_runtime::prelude::*;
}
