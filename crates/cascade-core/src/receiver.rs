//! The inbound event handed to the dispatcher by a receiver.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::ack::{AckFn, ack_fn, noop_ack_fn};
use crate::error::BoxError;

/// A receiver-supplied function that replies through the transport.
pub type RespondFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// One event as delivered by a transport.
#[derive(Clone)]
pub struct ReceiverEvent {
    /// The raw, untyped payload.
    pub body: Value,
    /// Acknowledges the event to the transport.
    pub ack: AckFn,
    /// Replies through the transport instead of a `response_url`.
    pub respond: Option<RespondFn>,
    /// Delivery attempt number reported by the platform.
    pub retry_num: Option<u64>,
    /// Why the platform retried the delivery.
    pub retry_reason: Option<String>,
    /// Receiver-specific values copied into the context.
    pub custom_properties: Map<String, Value>,
}

impl ReceiverEvent {
    /// Creates an event whose acknowledgment does nothing.
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ack: noop_ack_fn(),
            respond: None,
            retry_num: None,
            retry_reason: None,
            custom_properties: Map::new(),
        }
    }

    pub fn with_ack<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.ack = ack_fn(f);
        self
    }

    pub fn with_respond<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.respond = Some(Arc::new(move |message| {
            Box::pin(f(message)) as BoxFuture<'static, _>
        }));
        self
    }

    pub fn with_retry(mut self, num: u64, reason: impl Into<String>) -> Self {
        self.retry_num = Some(num);
        self.retry_reason = Some(reason.into());
        self
    }

    pub fn with_custom_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_properties.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Debug for ReceiverEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverEvent")
            .field("body", &self.body)
            .field("has_respond", &self.respond.is_some())
            .field("retry_num", &self.retry_num)
            .field("retry_reason", &self.retry_reason)
            .finish_non_exhaustive()
    }
}
