//! Factories for the utility closures attached to [`MiddlewareArgs`](cascade_core::MiddlewareArgs).
//!
//! Utilities capture the identifiers they need when they are built, so a
//! `say` created for one event always posts to that event's conversation.

use serde_json::{Map, Value, json};

use cascade_core::{BoundClient, BoxError, CascadeError, RespondFn, Utility};

/// Turns a bare string into `{ "text": ... }`; objects pass through.
pub fn to_message(input: Value) -> Value {
    match input {
        Value::String(text) => json!({ "text": text }),
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

fn with_fields(input: Value, fields: &[(&str, &str)]) -> Value {
    let mut message = to_message(input);
    if let Value::Object(map) = &mut message {
        for (key, value) in fields {
            map.insert((*key).to_string(), Value::String((*value).to_string()));
        }
    }
    message
}

// ============================================================================
// say / respond
// ============================================================================

/// `chat.postMessage` into `channel`.
pub fn say(client: BoundClient, channel: String) -> Utility {
    Utility::new("say", move |input| {
        post_message(client.clone(), channel.clone(), input)
    })
}

async fn post_message(client: BoundClient, channel: String, input: Value) -> Result<Value, BoxError> {
    let message = with_fields(input, &[("channel", channel.as_str())]);
    Ok(client.call("chat.postMessage", message).await?)
}

/// Replies through the receiver when it supplied a respond function,
/// otherwise through the body's `response_url`.
///
/// Returns `None` when neither is available.
pub fn respond(respond_fn: Option<RespondFn>, body: &Value, client: &BoundClient) -> Option<Utility> {
    if let Some(respond_fn) = respond_fn {
        return Some(Utility::new("respond", move |input| {
            let respond_fn = respond_fn.clone();
            async move {
                respond_fn(to_message(input)).await?;
                Ok::<Value, BoxError>(Value::Null)
            }
        }));
    }

    let url = response_url(body)?;
    let client = client.clone();
    Some(Utility::new("respond", move |input| {
        post_response(client.clone(), url.clone(), input)
    }))
}

async fn post_response(client: BoundClient, url: String, input: Value) -> Result<Value, BoxError> {
    client.post_to_url(&url, to_message(input)).await?;
    Ok(Value::Null)
}

fn response_url(body: &Value) -> Option<String> {
    body.get("response_url")
        .or_else(|| body.get("response_urls")?.get(0)?.get("response_url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

// ============================================================================
// Function completion
// ============================================================================

/// `functions.completeSuccess` for the captured execution.
pub fn complete_function(client: BoundClient, execution_id: Option<String>) -> Utility {
    Utility::new("complete", move |outputs| {
        complete_success(client.clone(), execution_id.clone(), outputs)
    })
}

/// `functions.completeError` for the captured execution.
pub fn fail_function(client: BoundClient, execution_id: Option<String>) -> Utility {
    Utility::new("fail", move |error| {
        complete_error(client.clone(), execution_id.clone(), error)
    })
}

fn require_execution(execution_id: Option<String>) -> Result<String, CascadeError> {
    execution_id.ok_or_else(|| CascadeError::CustomFunction {
        message: "no function_execution_id found for this event".into(),
    })
}

async fn complete_success(
    client: BoundClient,
    execution_id: Option<String>,
    outputs: Value,
) -> Result<Value, BoxError> {
    let function_execution_id = require_execution(execution_id)?;
    let outputs = if outputs.is_null() { json!({}) } else { outputs };
    let params = json!({ "function_execution_id": function_execution_id, "outputs": outputs });
    Ok(client.call("functions.completeSuccess", params).await?)
}

async fn complete_error(
    client: BoundClient,
    execution_id: Option<String>,
    error: Value,
) -> Result<Value, BoxError> {
    let function_execution_id = require_execution(execution_id)?;
    let error = match error {
        Value::Object(mut map) => map.remove("error").unwrap_or(Value::Null),
        other => other,
    };
    let params = json!({ "function_execution_id": function_execution_id, "error": error });
    Ok(client.call("functions.completeError", params).await?)
}

#[cfg(test)]
pub(crate) mod mock {
    //! A recording client shared by the framework tests.

    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use cascade_core::{ApiResult, BoundClient, Client};

    type Reply = Box<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

    #[derive(Default)]
    pub struct RecordingClient {
        pub calls: Mutex<Vec<(String, Option<String>, Value)>>,
        pub posts: Mutex<Vec<(String, Value)>>,
        reply: Option<Reply>,
    }

    impl RecordingClient {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Answers calls with `reply`, falling back to `{ ok: true }`.
        pub fn replying(
            reply: impl Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(Box::new(reply)),
                ..Default::default()
            })
        }

        pub fn bound(self: &Arc<Self>, token: Option<&str>) -> BoundClient {
            BoundClient::new(self.clone(), token.map(str::to_string))
        }

        pub fn methods(&self) -> Vec<String> {
            self.calls.lock().iter().map(|(m, _, _)| m.clone()).collect()
        }

        pub fn last_call(&self, method: &str) -> Option<Value> {
            self.calls
                .lock()
                .iter()
                .rev()
                .find(|(m, _, _)| m == method)
                .map(|(_, _, params)| params.clone())
        }
    }

    #[async_trait]
    impl Client for RecordingClient {
        async fn call(&self, method: &str, token: Option<&str>, params: Value) -> ApiResult<Value> {
            self.calls
                .lock()
                .push((method.to_string(), token.map(str::to_string), params.clone()));
            let reply = self.reply.as_ref().and_then(|reply| reply(method, &params));
            Ok(reply.unwrap_or_else(|| json!({ "ok": true })))
        }

        async fn post_to_url(&self, url: &str, payload: Value) -> ApiResult<()> {
            self.posts.lock().push((url.to_string(), payload));
            Ok(())
        }
    }
}
