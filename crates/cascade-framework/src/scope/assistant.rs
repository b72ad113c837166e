//! The assistant scope.
//!
//! Claims the three events of an assistant conversation:
//!
//! | Event | Kind |
//! |-------|------|
//! | `assistant_thread_started` | [`AssistantEvent::ThreadStarted`] |
//! | `assistant_thread_context_changed` | [`AssistantEvent::ThreadContextChanged`] |
//! | `message` in an assistant DM thread | [`AssistantEvent::UserMessage`] |
//!
//! Claimed events get a thread-bound `say` and the [`AssistantUtilities`].

use std::sync::Arc;

use serde_json::{Value, json};

use cascade_core::{
    AssistantUtilities, BoundClient, BoxError, BoxedMiddleware, CascadeError, CascadeResult,
    Context, Middleware, MiddlewareArgs, MiddlewareResult, Utility, into_middleware,
};

use super::thread_context::{
    AssistantThread, DefaultThreadContextStore, THREAD_CONTEXT_EVENT_TYPE, ThreadContextStore,
};
use super::{Scope, freeze};
use crate::utilities::to_message;

/// Sub-events of the assistant scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantEvent {
    ThreadStarted,
    ThreadContextChanged,
    UserMessage,
}

/// A registered assistant.
pub struct Assistant {
    thread_started: Arc<[BoxedMiddleware]>,
    thread_context_changed: Arc<[BoxedMiddleware]>,
    user_message: Arc<[BoxedMiddleware]>,
    store: Arc<dyn ThreadContextStore>,
}

impl Assistant {
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::default()
    }
}

/// Collects the middleware lists of an [`Assistant`].
#[derive(Default)]
pub struct AssistantBuilder {
    thread_started: Vec<BoxedMiddleware>,
    thread_context_changed: Vec<BoxedMiddleware>,
    user_message: Vec<BoxedMiddleware>,
    store: Option<Arc<dyn ThreadContextStore>>,
}

impl AssistantBuilder {
    pub fn thread_started<M: Middleware>(mut self, middleware: M) -> Self {
        self.thread_started.push(into_middleware(middleware));
        self
    }

    pub fn thread_context_changed<M: Middleware>(mut self, middleware: M) -> Self {
        self.thread_context_changed.push(into_middleware(middleware));
        self
    }

    pub fn user_message<M: Middleware>(mut self, middleware: M) -> Self {
        self.user_message.push(into_middleware(middleware));
        self
    }

    /// Replaces the default metadata-backed store.
    pub fn thread_context_store(mut self, store: impl ThreadContextStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Validates the registration.
    ///
    /// `thread_started` and `user_message` are required. Without explicit
    /// `thread_context_changed` middleware the new context is saved.
    pub fn build(mut self) -> CascadeResult<Assistant> {
        for (list, name) in [
            (&self.thread_started, "thread_started"),
            (&self.user_message, "user_message"),
        ] {
            if list.is_empty() {
                return Err(CascadeError::scope_initialization(
                    Assistant::NAME,
                    format!("`{name}` requires at least one middleware"),
                ));
            }
        }
        if self.thread_context_changed.is_empty() {
            self.thread_context_changed
                .push(into_middleware(save_changed_context));
        }

        Ok(Assistant {
            thread_started: freeze(self.thread_started),
            thread_context_changed: freeze(self.thread_context_changed),
            user_message: freeze(self.user_message),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(DefaultThreadContextStore)),
        })
    }
}

async fn save_changed_context(args: MiddlewareArgs) -> MiddlewareResult {
    if let Some(assistant) = &args.assistant {
        assistant.save_thread_context.call(Value::Null).await?;
    }
    Ok(())
}

/// A `message` that belongs to an assistant thread.
fn is_assistant_message(payload: &Value) -> bool {
    let in_thread = payload.get("channel").is_some() && payload.get("thread_ts").is_some();
    let in_dm = payload.get("channel_type").and_then(Value::as_str) == Some("im");
    let plain = match payload.get("subtype") {
        None => true,
        Some(subtype) => subtype.as_str() == Some("file_share"),
    };
    in_thread && in_dm && plain
}

impl Scope for Assistant {
    type Kind = AssistantEvent;
    const NAME: &'static str = "assistant";

    fn sub_event(&self, args: &MiddlewareArgs) -> Option<AssistantEvent> {
        let event = args.event()?;
        match event.get("type")?.as_str()? {
            "assistant_thread_started" => Some(AssistantEvent::ThreadStarted),
            "assistant_thread_context_changed" => Some(AssistantEvent::ThreadContextChanged),
            "message" if event.get("thread_ts").is_some() => Some(AssistantEvent::UserMessage),
            _ => None,
        }
    }

    fn matches_constraints(&self, kind: AssistantEvent, args: &MiddlewareArgs) -> bool {
        match kind {
            AssistantEvent::UserMessage => is_assistant_message(&args.payload),
            _ => true,
        }
    }

    fn middleware(&self, kind: AssistantEvent) -> Arc<[BoxedMiddleware]> {
        match kind {
            AssistantEvent::ThreadStarted => Arc::clone(&self.thread_started),
            AssistantEvent::ThreadContextChanged => Arc::clone(&self.thread_context_changed),
            AssistantEvent::UserMessage => Arc::clone(&self.user_message),
        }
    }

    fn augment(&self, _kind: AssistantEvent, args: &mut MiddlewareArgs) -> CascadeResult<()> {
        let thread = Arc::new(AssistantThread::from_payload(&args.payload)?);
        let bound = ThreadBound {
            thread,
            client: args.client.clone(),
            context: args.context.clone(),
            store: Arc::clone(&self.store),
        };

        args.say = Some(bound.utility("say", ThreadBound::say));
        args.assistant = Some(AssistantUtilities {
            set_status: bound.method("set_status", "assistant.threads.setStatus", "status"),
            set_title: bound.method("set_title", "assistant.threads.setTitle", "title"),
            set_suggested_prompts: bound.method(
                "set_suggested_prompts",
                "assistant.threads.setSuggestedPrompts",
                "prompts",
            ),
            get_thread_context: bound.utility("get_thread_context", ThreadBound::get_context),
            save_thread_context: bound.utility("save_thread_context", ThreadBound::save_context),
        });
        Ok(())
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Everything a thread utility needs, captured once per claimed event.
#[derive(Clone)]
struct ThreadBound {
    thread: Arc<AssistantThread>,
    client: BoundClient,
    context: Context,
    store: Arc<dyn ThreadContextStore>,
}

impl ThreadBound {
    fn utility<F, Fut>(&self, name: &'static str, f: F) -> Utility
    where
        F: Fn(ThreadBound, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let bound = self.clone();
        Utility::new(name, move |input| f(bound.clone(), input))
    }

    /// An `assistant.threads.*` call. A bare value is sent as `field`.
    fn method(&self, name: &'static str, method: &'static str, field: &'static str) -> Utility {
        self.utility(name, move |bound, input| {
            bound.call_thread_method(method, field, input)
        })
    }

    async fn call_thread_method(
        self,
        method: &'static str,
        field: &'static str,
        input: Value,
    ) -> Result<Value, BoxError> {
        let mut params = match input {
            Value::Object(map) => Value::Object(map),
            other => json!({ field: other }),
        };
        params["channel_id"] = json!(self.thread.channel_id);
        params["thread_ts"] = json!(self.thread.thread_ts);
        Ok(self.client.call(method, params).await?)
    }

    /// Posts into the thread, tagging the message with the stored context.
    async fn say(self, input: Value) -> Result<Value, BoxError> {
        let mut message = to_message(input);
        message["channel"] = json!(self.thread.channel_id);
        message["thread_ts"] = json!(self.thread.thread_ts);

        if message.get("metadata").is_none() {
            let stored = self
                .store
                .get(&self.thread, &self.client, &self.context)
                .await?;
            if stored.as_object().is_some_and(|m| !m.is_empty()) {
                message["metadata"] = json!({
                    "event_type": THREAD_CONTEXT_EVENT_TYPE,
                    "event_payload": stored,
                });
            }
        }
        Ok(self.client.call("chat.postMessage", message).await?)
    }

    async fn get_context(self, _input: Value) -> Result<Value, BoxError> {
        self.store
            .get(&self.thread, &self.client, &self.context)
            .await
    }

    async fn save_context(self, _input: Value) -> Result<Value, BoxError> {
        self.store
            .save(&self.thread, &self.client, &self.context)
            .await?;
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopedDispatcher;
    use crate::utilities::mock::RecordingClient;
    use cascade_core::context::keys;
    use cascade_core::{EventCategory, ErrorCode, classify, run_middleware_chain};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args_for(body: Value, client: &Arc<RecordingClient>) -> MiddlewareArgs {
        let category = classify(&body).unwrap().category;
        let ctx = Context::new();
        ctx.insert(keys::BOT_USER_ID, "UBOT");
        MiddlewareArgs::new(body, category, ctx, client.bound(Some("xoxb")))
    }

    fn noop() -> impl Middleware {
        |_args: MiddlewareArgs| async { Ok::<(), BoxError>(()) }
    }

    fn im_message() -> Value {
        json!({ "event": {
            "type": "message", "channel": "D1", "channel_type": "im",
            "thread_ts": "10.0", "ts": "10.5", "user": "U1", "text": "help"
        } })
    }

    #[test]
    fn test_registration_requires_handlers() {
        let err = Assistant::builder().user_message(noop()).build().err().unwrap();
        assert_eq!(err.code(), ErrorCode::ScopeInitialization);
        assert!(err.to_string().contains("thread_started"));

        let err = Assistant::builder().thread_started(noop()).build().err().unwrap();
        assert!(err.to_string().contains("user_message"));

        let assistant = Assistant::builder()
            .thread_started(noop())
            .user_message(noop())
            .build()
            .unwrap();
        assert_eq!(assistant.thread_context_changed.len(), 1);
    }

    #[test]
    fn test_sub_events_and_constraints() {
        let assistant = Assistant::builder()
            .thread_started(noop())
            .user_message(noop())
            .build()
            .unwrap();
        let client = RecordingClient::new();
        let kind_of = |body: Value| {
            let args = args_for(body, &client);
            assistant
                .sub_event(&args)
                .filter(|kind| assistant.matches_constraints(*kind, &args))
        };

        assert_eq!(kind_of(im_message()), Some(AssistantEvent::UserMessage));
        assert_eq!(
            kind_of(json!({ "event": { "type": "assistant_thread_started", "assistant_thread": {} } })),
            Some(AssistantEvent::ThreadStarted)
        );

        let mut channel_message = im_message();
        channel_message["event"]["channel_type"] = json!("channel");
        assert_eq!(kind_of(channel_message), None);

        let mut edited = im_message();
        edited["event"]["subtype"] = json!("message_changed");
        assert_eq!(kind_of(edited), None);

        let mut shared_file = im_message();
        shared_file["event"]["subtype"] = json!("file_share");
        assert_eq!(kind_of(shared_file), Some(AssistantEvent::UserMessage));

        let mut top_level = im_message();
        top_level["event"].as_object_mut().unwrap().remove("thread_ts");
        assert_eq!(kind_of(top_level), None);
    }

    #[tokio::test]
    async fn test_user_message_runs_private_chain_without_outer_next() {
        let client = RecordingClient::new();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();

        let assistant = Assistant::builder()
            .thread_started(noop())
            .user_message(move |args: MiddlewareArgs| {
                let sink = sink.clone();
                async move {
                    sink.lock().push(args.next.is_none());
                    let utilities = args.assistant.clone().unwrap();
                    utilities.set_status.call("is typing...").await?;
                    args.say.as_ref().unwrap().call("on it").await?;
                    args.next().await
                }
            })
            .build()
            .unwrap();

        let outer = Arc::new(AtomicUsize::new(0));
        let counter = outer.clone();
        let global: Arc<[BoxedMiddleware]> = vec![
            ScopedDispatcher::new(assistant).into_middleware(),
            into_middleware(move |args: MiddlewareArgs| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    args.next().await
                }
            }),
        ]
        .into();

        run_middleware_chain(global, args_for(im_message(), &client), || async {
            Ok::<(), BoxError>(())
        })
        .await
        .unwrap();

        assert_eq!(*observed.lock(), vec![true]);
        assert_eq!(outer.load(Ordering::SeqCst), 0);
        assert_eq!(
            client.last_call("assistant.threads.setStatus"),
            Some(json!({ "status": "is typing...", "channel_id": "D1", "thread_ts": "10.0" }))
        );
        let posted = client.last_call("chat.postMessage").unwrap();
        assert_eq!(posted["channel"], "D1");
        assert_eq!(posted["thread_ts"], "10.0");
        assert_eq!(posted["text"], "on it");
        assert!(posted.get("metadata").is_none());
    }

    #[tokio::test]
    async fn test_context_changed_defaults_to_saving() {
        let client = RecordingClient::replying(|method, _| {
            (method == "conversations.replies").then(|| {
                json!({ "messages": [{ "user": "UBOT", "ts": "10.1", "text": "Hi" }] })
            })
        });
        let assistant = Assistant::builder()
            .thread_started(noop())
            .user_message(noop())
            .build()
            .unwrap();

        let body = json!({ "event": {
            "type": "assistant_thread_context_changed",
            "assistant_thread": { "channel_id": "D1", "thread_ts": "10.0", "context": { "channel_id": "C7" } }
        } });
        let args = args_for(body, &client);
        assert_eq!(args.category, EventCategory::Event);
        ScopedDispatcher::new(assistant).process(args).await.unwrap();

        let update = client.last_call("chat.update").unwrap();
        assert_eq!(update["ts"], "10.1");
        assert_eq!(update["metadata"]["event_payload"], json!({ "channel_id": "C7" }));
    }

    #[tokio::test]
    async fn test_missing_thread_fails_claimed_event() {
        let assistant = Assistant::builder()
            .thread_started(noop())
            .user_message(noop())
            .build()
            .unwrap();
        let client = RecordingClient::new();
        let body = json!({ "event": { "type": "assistant_thread_started", "assistant_thread": { "channel_id": "D1" } } });
        let err = ScopedDispatcher::new(assistant)
            .process(args_for(body, &client))
            .await
            .unwrap_err();
        assert_eq!(CascadeError::from_boxed(err).code(), ErrorCode::AssistantMissingProperty);
    }
}
