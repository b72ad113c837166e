//! # Cascade Framework
//!
//! Registration and dispatch on top of the core chain executor.
//!
//! This layer provides:
//! - Listener groups and the dispatcher ([`Listener`], [`App`])
//! - Built-in filter middleware and constraint matching
//! - Routing helpers for common event kinds (`on_message`, `on_action`, ...)
//! - The error handler in its basic and extended forms
//! - Scoped sub-dispatchers: assistants, custom functions and workflow steps

pub mod app;
pub mod constraints;
pub mod error_handler;
pub mod listener;
pub mod pattern;
pub mod routing;
pub mod scope;
pub mod settings;
pub mod utilities;

pub use app::{App, AppBuilder};
pub use constraints::{
    Constraints, direct_mention, ignore_self, match_command_name, match_event_type,
    match_message, matches_constraints, only_actions, only_commands, only_events, only_options,
    only_shortcuts, only_view_actions, subtype,
};
pub use error_handler::{ErrorHandler, ExtendedErrorArgs};
pub use listener::Listener;
pub use pattern::{Pattern, PatternMatch};
pub use routing::{
    on_action, on_command, on_event, on_message, on_message_matching, on_options, on_shortcut,
    on_view,
};
pub use scope::assistant::{Assistant, AssistantBuilder, AssistantEvent};
pub use scope::function::{CustomFunction, CustomFunctionBuilder};
pub use scope::thread_context::{
    AssistantThread, DefaultThreadContextStore, ThreadContextStore,
};
pub use scope::workflow_step::{StepEvent, WorkflowStep, WorkflowStepBuilder};
pub use scope::{Scope, ScopedDispatcher};
pub use settings::AppSettings;
