//! # Cascade Core
//!
//! Leaf abstractions of the Cascade dispatch engine.
//!
//! This crate knows nothing about listeners or scopes. It provides:
//! - **Classification**: untyped bodies to [`EventCategory`] ([`classify`])
//! - **Context**: the per-dispatch shared map ([`Context`])
//! - **Args**: the bundle handed to middleware ([`MiddlewareArgs`], [`Utility`])
//! - **Chains**: the continuation-based executor ([`run_middleware_chain`], [`Next`])
//! - **Acknowledgment**: exactly-once [`Ack`]
//! - **Collaborators**: [`Authorize`] and [`Client`]
//! - **Errors**: the coded [`CascadeError`] taxonomy
//!
//! ## Chain Execution
//!
//! ```text
//! ┌────────┐ next() ┌────────┐ next() ┌──────────┐
//! │   A    │───────▶│   B    │───────▶│ terminal │
//! │        │◀───────│        │◀───────│          │
//! └────────┘        └────────┘        └──────────┘
//! ```
//!
//! Each `next()` resolves once everything after it has settled, and errors
//! travel back along the same path.

pub mod ack;
pub mod args;
pub mod authorize;
pub mod client;
pub mod context;
pub mod error;
pub mod event;
pub mod middleware;
pub mod receiver;

pub use ack::{Ack, AckFn, DEFAULT_ACK_TIMEOUT};
pub use args::{AssistantUtilities, MiddlewareArgs, StepUtilities, Utility};
pub use authorize::{
    Authorize, AuthorizeResult, AuthorizeSourceData, BoxedAuthorize, SingleTeamAuthorization,
    StaticAuthorization, skips_authorization,
};
pub use client::{BoundClient, BoxedClient, Client, UnconfiguredClient};
pub use context::Context;
pub use error::{ApiError, ApiResult, BoxError, CascadeError, CascadeResult, ErrorCode};
pub use event::{Classification, EventCategory, classify, payload_for};
pub use middleware::{
    BoxedMiddleware, Middleware, MiddlewareResult, Next, into_middleware,
    run_final_callback_chain, run_middleware_chain,
};
pub use receiver::{ReceiverEvent, RespondFn};

// Re-export for middleware authors
pub use futures::future::BoxFuture;
