//! Assistant thread context persistence.
//!
//! The context of an assistant thread (the channel the user was looking at
//! when the thread opened, for instance) arrives on
//! `assistant_thread_started` and `assistant_thread_context_changed` events
//! but not on user messages. A [`ThreadContextStore`] keeps it in between.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use cascade_core::{BoundClient, BoxError, CascadeError, CascadeResult, Context};

/// Metadata event type under which the default store saves thread context.
pub const THREAD_CONTEXT_EVENT_TYPE: &str = "assistant_thread_context";

/// The thread an assistant event belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantThread {
    pub channel_id: String,
    pub thread_ts: String,
    /// Context carried by the event itself; empty for user messages.
    pub context: Value,
}

impl AssistantThread {
    /// Reads thread coordinates from an assistant event payload.
    ///
    /// `assistant_thread.{channel_id, thread_ts}` wins over the message-level
    /// `channel` / `thread_ts`.
    pub fn from_payload(payload: &Value) -> CascadeResult<Self> {
        let str_at = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

        let mut channel_id = str_at(payload, "channel");
        let mut thread_ts = str_at(payload, "thread_ts");
        let mut context = Value::Object(Map::new());

        if let Some(thread) = payload.get("assistant_thread") {
            channel_id = str_at(thread, "channel_id");
            thread_ts = str_at(thread, "thread_ts");
            if let Some(c) = thread.get("context") {
                context = c.clone();
            }
        }

        Ok(Self {
            channel_id: channel_id.ok_or(CascadeError::AssistantMissingProperty {
                property: "channel_id",
            })?,
            thread_ts: thread_ts.ok_or(CascadeError::AssistantMissingProperty {
                property: "thread_ts",
            })?,
            context,
        })
    }
}

/// Loads and saves the context of assistant threads.
#[async_trait]
pub trait ThreadContextStore: Send + Sync + 'static {
    async fn get(
        &self,
        thread: &AssistantThread,
        client: &BoundClient,
        context: &Context,
    ) -> Result<Value, BoxError>;

    async fn save(
        &self,
        thread: &AssistantThread,
        client: &BoundClient,
        context: &Context,
    ) -> Result<(), BoxError>;
}

/// Stores thread context in the metadata of the bot's first thread message.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultThreadContextStore;

impl DefaultThreadContextStore {
    /// Finds the first plain message the bot posted in the thread.
    async fn initial_message(
        thread: &AssistantThread,
        client: &BoundClient,
        context: &Context,
    ) -> Result<Option<Value>, BoxError> {
        let replies = client
            .call(
                "conversations.replies",
                json!({
                    "channel": thread.channel_id,
                    "ts": thread.thread_ts,
                    "oldest": thread.thread_ts,
                    "include_all_metadata": true,
                    "limit": 4,
                }),
            )
            .await?;

        let bot_user_id = context.bot_user_id();
        let found = replies
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|messages| {
                messages.iter().find(|m| {
                    m.get("subtype").is_none()
                        && m.get("user").and_then(Value::as_str) == bot_user_id.as_deref()
                })
            })
            .cloned();
        Ok(found)
    }
}

#[async_trait]
impl ThreadContextStore for DefaultThreadContextStore {
    async fn get(
        &self,
        thread: &AssistantThread,
        client: &BoundClient,
        context: &Context,
    ) -> Result<Value, BoxError> {
        let message = Self::initial_message(thread, client, context).await?;
        let payload = message
            .as_ref()
            .and_then(|m| m.get("metadata")?.get("event_payload"))
            .cloned();
        Ok(payload.unwrap_or_else(|| Value::Object(Map::new())))
    }

    async fn save(
        &self,
        thread: &AssistantThread,
        client: &BoundClient,
        context: &Context,
    ) -> Result<(), BoxError> {
        let Some(message) = Self::initial_message(thread, client, context).await? else {
            debug!(channel = %thread.channel_id, "No bot message in thread, context not saved");
            return Ok(());
        };

        let mut params = json!({
            "channel": thread.channel_id,
            "ts": message.get("ts").cloned().unwrap_or(Value::Null),
            "metadata": {
                "event_type": THREAD_CONTEXT_EVENT_TYPE,
                "event_payload": thread.context,
            },
        });
        for key in ["text", "blocks"] {
            if let Some(value) = message.get(key) {
                params[key] = value.clone();
            }
        }
        client.call("chat.update", params).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::mock::RecordingClient;
    use cascade_core::ErrorCode;
    use cascade_core::context::keys;

    fn thread() -> AssistantThread {
        AssistantThread {
            channel_id: "D1".into(),
            thread_ts: "100.1".into(),
            context: json!({ "channel_id": "C9" }),
        }
    }

    fn replies() -> Value {
        json!({
            "messages": [
                { "user": "UBOT", "subtype": "assistant_app_thread", "ts": "100.1" },
                { "user": "U1", "ts": "100.2", "text": "hello" },
                {
                    "user": "UBOT", "ts": "100.3", "text": "Hi!",
                    "metadata": { "event_type": THREAD_CONTEXT_EVENT_TYPE, "event_payload": { "channel_id": "C1" } }
                }
            ]
        })
    }

    fn bot_context() -> Context {
        let ctx = Context::new();
        ctx.insert(keys::BOT_USER_ID, "UBOT");
        ctx
    }

    #[test]
    fn test_thread_from_payloads() {
        let started = json!({
            "type": "assistant_thread_started",
            "assistant_thread": { "channel_id": "D1", "thread_ts": "1.0", "context": { "channel_id": "C1" } }
        });
        let t = AssistantThread::from_payload(&started).unwrap();
        assert_eq!((t.channel_id.as_str(), t.thread_ts.as_str()), ("D1", "1.0"));
        assert_eq!(t.context, json!({ "channel_id": "C1" }));

        let message = json!({ "type": "message", "channel": "D2", "thread_ts": "2.0" });
        let t = AssistantThread::from_payload(&message).unwrap();
        assert_eq!(t.channel_id, "D2");
        assert_eq!(t.context, json!({}));

        let err = AssistantThread::from_payload(&json!({ "channel": "D3" })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AssistantMissingProperty);
    }

    #[tokio::test]
    async fn test_default_store_reads_bot_message_metadata() {
        let client = RecordingClient::replying(|method, _| {
            (method == "conversations.replies").then(replies)
        });
        let stored = DefaultThreadContextStore
            .get(&thread(), &client.bound(None), &bot_context())
            .await
            .unwrap();
        assert_eq!(stored, json!({ "channel_id": "C1" }));

        let params = client.last_call("conversations.replies").unwrap();
        assert_eq!(params["include_all_metadata"], true);
        assert_eq!(params["limit"], 4);
    }

    #[tokio::test]
    async fn test_default_store_saves_into_bot_message() {
        let client = RecordingClient::replying(|method, _| {
            (method == "conversations.replies").then(replies)
        });
        DefaultThreadContextStore
            .save(&thread(), &client.bound(None), &bot_context())
            .await
            .unwrap();

        let update = client.last_call("chat.update").unwrap();
        assert_eq!(update["ts"], "100.3");
        assert_eq!(update["text"], "Hi!");
        assert_eq!(update["metadata"]["event_payload"], json!({ "channel_id": "C9" }));
    }

    #[tokio::test]
    async fn test_default_store_without_bot_message() {
        let client = RecordingClient::replying(|_, _| Some(json!({ "messages": [] })));
        let ctx = bot_context();
        let stored = DefaultThreadContextStore
            .get(&thread(), &client.bound(None), &ctx)
            .await
            .unwrap();
        assert_eq!(stored, json!({}));
        DefaultThreadContextStore
            .save(&thread(), &client.bound(None), &ctx)
            .await
            .unwrap();
        assert!(client.last_call("chat.update").is_none());
    }
}
