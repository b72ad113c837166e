//! The argument bundle passed to every middleware.
//!
//! A [`MiddlewareArgs`] is built once per dispatch. The chain executor hands
//! each middleware its own shallow clone with a fresh [`Next`] attached;
//! everything else is shared through `Arc`s, including the [`Context`].

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::ack::Ack;
use crate::client::BoundClient;
use crate::context::Context;
use crate::error::BoxError;
use crate::event::{EventCategory, event_type, payload_for};
use crate::middleware::{MiddlewareResult, Next};

// ============================================================================
// Utility
// ============================================================================

type UtilityFn = dyn Fn(Value) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;

/// A utility closure such as `say`, `respond` or `complete`.
///
/// Utilities take one JSON argument and resolve to the API response.
#[derive(Clone)]
pub struct Utility {
    name: &'static str,
    func: Arc<UtilityFn>,
}

impl Utility {
    pub fn new<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        Self {
            name,
            func: Arc::new(move |input| Box::pin(f(input)) as BoxFuture<'static, _>),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes the utility.
    pub async fn call(&self, input: impl Into<Value>) -> Result<Value, BoxError> {
        (self.func)(input.into()).await
    }
}

impl std::fmt::Debug for Utility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Utility").field(&self.name).finish()
    }
}

/// Utilities available inside an assistant scope.
#[derive(Clone, Debug)]
pub struct AssistantUtilities {
    /// `assistant.threads.setStatus`
    pub set_status: Utility,
    /// `assistant.threads.setTitle`
    pub set_title: Utility,
    /// `assistant.threads.setSuggestedPrompts`
    pub set_suggested_prompts: Utility,
    /// Loads the stored thread context.
    pub get_thread_context: Utility,
    /// Persists the thread context carried by the event.
    pub save_thread_context: Utility,
}

/// Utilities available inside a workflow step scope.
#[derive(Clone, Debug)]
pub struct StepUtilities {
    /// Opens the step configuration modal (edit).
    pub configure: Option<Utility>,
    /// Saves the step inputs and outputs (save).
    pub update: Option<Utility>,
}

// ============================================================================
// MiddlewareArgs
// ============================================================================

/// Everything a middleware can see or do for one event.
#[derive(Clone)]
pub struct MiddlewareArgs {
    /// The raw event body.
    pub body: Arc<Value>,
    /// Category assigned by the classifier.
    pub category: EventCategory,
    /// Category-specific part of the body.
    pub payload: Arc<Value>,
    /// The dispatch context, shared by every middleware of this event.
    pub context: Context,
    /// API client bound to the token selected for this event.
    pub client: BoundClient,
    /// Acknowledgment; absent for auto-acknowledged categories.
    pub ack: Option<Ack>,
    /// Posts a message to the event's conversation.
    pub say: Option<Utility>,
    /// Replies through the transport or the event's `response_url`.
    pub respond: Option<Utility>,
    /// Completes the running function or workflow step.
    pub complete: Option<Utility>,
    /// Fails the running function or workflow step.
    pub fail: Option<Utility>,
    pub assistant: Option<AssistantUtilities>,
    pub step: Option<StepUtilities>,
    /// Continuation into the rest of the chain.
    pub next: Option<Next>,
}

impl MiddlewareArgs {
    /// Builds args for a classified body with no utilities attached.
    pub fn new(body: Value, category: EventCategory, context: Context, client: BoundClient) -> Self {
        let payload = payload_for(category, &body);
        Self {
            body: Arc::new(body),
            category,
            payload: Arc::new(payload),
            context,
            client,
            ack: None,
            say: None,
            respond: None,
            complete: None,
            fail: None,
            assistant: None,
            step: None,
            next: None,
        }
    }

    /// Runs the rest of the chain.
    ///
    /// Resolves immediately when no continuation is attached, which is the
    /// case for the last middleware of a scope.
    pub async fn next(&self) -> MiddlewareResult {
        match &self.next {
            Some(next) => next.run().await,
            None => Ok(()),
        }
    }

    /// Acknowledges the event, if it expects an explicit acknowledgment.
    pub async fn ack(&self) -> MiddlewareResult {
        match &self.ack {
            Some(ack) => ack.ack().await,
            None => Ok(()),
        }
    }

    // ─── Category aliases ─────────────────────────────────────────────────────

    fn payload_if(&self, categories: &[EventCategory]) -> Option<&Value> {
        categories
            .contains(&self.category)
            .then_some(&*self.payload)
    }

    /// The event, for Events API bodies.
    pub fn event(&self) -> Option<&Value> {
        self.payload_if(&[EventCategory::Event, EventCategory::FunctionExecution])
    }

    /// The event, when it is a `message`.
    pub fn message(&self) -> Option<&Value> {
        self.event()
            .filter(|_| event_type(&self.body) == Some("message"))
    }

    pub fn action(&self) -> Option<&Value> {
        self.payload_if(&[EventCategory::Action])
    }

    pub fn command(&self) -> Option<&Value> {
        self.payload_if(&[EventCategory::Command])
    }

    pub fn options(&self) -> Option<&Value> {
        self.payload_if(&[EventCategory::Options])
    }

    pub fn shortcut(&self) -> Option<&Value> {
        self.payload_if(&[EventCategory::Shortcut])
    }

    pub fn view(&self) -> Option<&Value> {
        self.payload_if(&[EventCategory::ViewAction])
    }

    /// `event.type`, or the body's top-level `type`.
    pub fn payload_type(&self) -> Option<&str> {
        event_type(&self.body).or_else(|| self.body.get("type")?.as_str())
    }
}

impl std::fmt::Debug for MiddlewareArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareArgs")
            .field("category", &self.category)
            .field("context", &self.context)
            .field("has_ack", &self.ack.is_some())
            .field("has_say", &self.say.is_some())
            .field("has_next", &self.next.is_some())
            .finish_non_exhaustive()
    }
}
