//! The API client collaborator.
//!
//! The engine never builds network requests itself. Utility closures such as
//! `say`, `complete` or `set_status` invoke methods on an injected [`Client`],
//! and every [`MiddlewareArgs`](crate::MiddlewareArgs) carries a
//! [`BoundClient`] whose token was chosen from the dispatch context.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::error::{ApiError, ApiResult};

/// A platform Web API client.
///
/// Implementations translate `ok: false` responses into
/// [`ApiError::Platform`].
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Calls a Web API method such as `chat.postMessage`.
    async fn call(&self, method: &str, token: Option<&str>, params: Value) -> ApiResult<Value>;

    /// Posts a payload to a `response_url`.
    async fn post_to_url(&self, url: &str, payload: Value) -> ApiResult<()>;
}

/// A boxed Client trait object.
pub type BoxedClient = Arc<dyn Client>;

/// Placeholder used when an application never configured a client.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredClient;

#[async_trait]
impl Client for UnconfiguredClient {
    async fn call(&self, method: &str, _token: Option<&str>, _params: Value) -> ApiResult<Value> {
        Err(ApiError::Request(format!(
            "no API client configured, cannot call `{method}`"
        )))
    }

    async fn post_to_url(&self, _url: &str, _payload: Value) -> ApiResult<()> {
        Err(ApiError::Request("no API client configured".into()))
    }
}

/// A client paired with the token selected for one dispatch.
#[derive(Clone)]
pub struct BoundClient {
    inner: BoxedClient,
    token: Option<String>,
}

impl BoundClient {
    pub fn new(inner: BoxedClient, token: Option<String>) -> Self {
        Self { inner, token }
    }

    /// Binds the best token available in `ctx`.
    ///
    /// Order: the function token (only when `attach_function_token` is set),
    /// then the bot token, the user token and finally the app token.
    pub fn for_context(inner: BoxedClient, ctx: &Context, attach_function_token: bool) -> Self {
        let function_token = attach_function_token
            .then(|| ctx.function_bot_access_token())
            .flatten();
        let token = function_token
            .or_else(|| ctx.bot_token())
            .or_else(|| ctx.user_token())
            .or_else(|| ctx.app_token());
        Self::new(inner, token)
    }

    /// Returns the bound token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the unbound client.
    pub fn inner(&self) -> &BoxedClient {
        &self.inner
    }

    /// Calls a Web API method with the bound token.
    pub async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
        self.inner.call(method, self.token(), params).await
    }

    /// Posts a payload to a `response_url`.
    pub async fn post_to_url(&self, url: &str, payload: Value) -> ApiResult<()> {
        self.inner.post_to_url(url, payload).await
    }
}

impl std::fmt::Debug for BoundClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundClient")
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}
