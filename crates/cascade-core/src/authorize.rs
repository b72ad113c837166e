//! The authorize collaborator.
//!
//! Before any middleware runs, the dispatcher asks an [`Authorize`]
//! implementation for the credentials that belong to the event's workspace.
//! The resolved [`AuthorizeResult`] seeds the dispatch [`Context`](crate::Context).
//!
//! A fixed set of event types never goes through authorization: they arrive
//! after an installation is gone (`app_uninstalled`, `tokens_revoked`) or
//! carry their own short-lived token (`function_executed`).

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::client::Client;
use crate::error::BoxError;
use crate::event::{event_type, string_at};

/// Event types that are dispatched without consulting the authorize collaborator.
pub const SKIP_AUTHORIZATION_EVENT_TYPES: &[&str] =
    &["app_uninstalled", "tokens_revoked", "function_executed"];

/// Returns `true` if the body is exempt from authorization.
pub fn skips_authorization(body: &Value) -> bool {
    event_type(body).is_some_and(|t| SKIP_AUTHORIZATION_EVENT_TYPES.contains(&t))
}

// =============================================================================
// Source Data
// =============================================================================

/// Identifiers the authorize collaborator uses to look up an installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeSourceData {
    pub team_id: Option<String>,
    pub enterprise_id: Option<String>,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub is_enterprise_install: bool,
}

impl AuthorizeSourceData {
    /// Derives source data from a raw body and its classified conversation.
    pub fn from_body(body: &Value, conversation_id: Option<String>) -> Self {
        let first_authorization = body
            .get("authorizations")
            .and_then(Value::as_array)
            .and_then(|a| a.first());

        let team_id = string_at(body, &["team_id"])
            .or_else(|| string_at(body, &["team", "id"]))
            .or_else(|| string_at(body, &["event", "team"]))
            .or_else(|| string_at(body, &["user", "team_id"]));

        let enterprise_id = string_at(body, &["enterprise_id"])
            .or_else(|| string_at(body, &["enterprise", "id"]))
            .or_else(|| first_authorization.and_then(|a| string_at(a, &["enterprise_id"])));

        let user_id = string_at(body, &["user_id"])
            .or_else(|| string_at(body, &["user", "id"]))
            .or_else(|| string_at(body, &["event", "user"]))
            .or_else(|| string_at(body, &["event", "user", "id"]));

        let is_enterprise_install = body
            .get("is_enterprise_install")
            .or_else(|| first_authorization.and_then(|a| a.get("is_enterprise_install")))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self {
            team_id,
            enterprise_id,
            user_id,
            conversation_id,
            is_enterprise_install,
        }
    }
}

// =============================================================================
// Result
// =============================================================================

/// Credentials and identifiers resolved for one event.
///
/// Unknown fields are kept in `extra` and copied into the context verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeResult {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub user_token: Option<String>,
    #[serde(default)]
    pub app_token: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub bot_user_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub enterprise_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Authorize Trait
// =============================================================================

/// Resolves credentials for an incoming event.
///
/// Returning an error short-circuits the dispatch with an authorization
/// error before any middleware runs.
///
/// Implemented for async closures taking `(AuthorizeSourceData, Value)`:
///
/// ```rust,ignore
/// let authorize = |source: AuthorizeSourceData, _body: Value| async move {
///     store.lookup(source.team_id.as_deref()).await
/// };
/// ```
#[async_trait]
pub trait Authorize: Send + Sync + 'static {
    async fn authorize(
        &self,
        source: &AuthorizeSourceData,
        body: &Value,
    ) -> Result<AuthorizeResult, BoxError>;
}

#[async_trait]
impl<F, Fut> Authorize for F
where
    F: Fn(AuthorizeSourceData, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AuthorizeResult, BoxError>> + Send + 'static,
{
    async fn authorize(
        &self,
        source: &AuthorizeSourceData,
        body: &Value,
    ) -> Result<AuthorizeResult, BoxError> {
        (self)(source.clone(), body.clone()).await
    }
}

/// A type-erased authorize collaborator.
pub type BoxedAuthorize = Arc<dyn Authorize>;

/// Hands out the same credentials for every event.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorization {
    result: AuthorizeResult,
}

impl StaticAuthorization {
    pub fn new(result: AuthorizeResult) -> Self {
        Self { result }
    }

    /// Authorization with only a bot token.
    pub fn bot_token(token: impl Into<String>) -> Self {
        Self::new(AuthorizeResult {
            bot_token: Some(token.into()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Authorize for StaticAuthorization {
    async fn authorize(
        &self,
        _source: &AuthorizeSourceData,
        _body: &Value,
    ) -> Result<AuthorizeResult, BoxError> {
        Ok(self.result.clone())
    }
}

/// Single-workspace authorization from one bot token.
///
/// The bot and bot-user identifiers are resolved through `auth.test` on the
/// first event and cached for the lifetime of the collaborator.
pub struct SingleTeamAuthorization {
    token: String,
    client: Arc<dyn Client>,
    resolved: OnceCell<AuthorizeResult>,
}

impl SingleTeamAuthorization {
    pub fn new(token: impl Into<String>, client: Arc<dyn Client>) -> Self {
        Self {
            token: token.into(),
            client,
            resolved: OnceCell::new(),
        }
    }

    async fn resolve(&self) -> Result<AuthorizeResult, BoxError> {
        let info = self
            .client
            .call("auth.test", Some(self.token.as_str()), json!({}))
            .await?;
        debug!(bot_id = ?info.get("bot_id"), "Resolved single-team bot identity");
        Ok(AuthorizeResult {
            bot_token: Some(self.token.clone()),
            bot_id: string_at(&info, &["bot_id"]),
            bot_user_id: string_at(&info, &["user_id"]),
            team_id: string_at(&info, &["team_id"]),
            enterprise_id: string_at(&info, &["enterprise_id"]),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Authorize for SingleTeamAuthorization {
    async fn authorize(
        &self,
        _source: &AuthorizeSourceData,
        _body: &Value,
    ) -> Result<AuthorizeResult, BoxError> {
        let result = self.resolved.get_or_try_init(|| self.resolve()).await?;
        Ok(result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ApiResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AuthTestClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Client for AuthTestClient {
        async fn call(&self, method: &str, token: Option<&str>, _params: Value) -> ApiResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(method, "auth.test");
            assert_eq!(token, Some("xoxb-single"));
            Ok(json!({ "ok": true, "bot_id": "B1", "user_id": "UBOT", "team_id": "T1" }))
        }

        async fn post_to_url(&self, _url: &str, _payload: Value) -> ApiResult<()> {
            Err(ApiError::Request("unused".into()))
        }
    }

    #[test]
    fn test_source_from_event_body() {
        let body = json!({
            "team_id": "T1",
            "authorizations": [{ "enterprise_id": "E1", "is_enterprise_install": true }],
            "event": { "type": "message", "user": "U1" }
        });
        let source = AuthorizeSourceData::from_body(&body, Some("C1".into()));
        assert_eq!(source.team_id.as_deref(), Some("T1"));
        assert_eq!(source.enterprise_id.as_deref(), Some("E1"));
        assert_eq!(source.user_id.as_deref(), Some("U1"));
        assert_eq!(source.conversation_id.as_deref(), Some("C1"));
        assert!(source.is_enterprise_install);
    }

    #[test]
    fn test_source_from_interaction_body() {
        let body = json!({
            "type": "block_actions",
            "team": { "id": "T2" },
            "user": { "id": "U2", "team_id": "T2" },
            "enterprise": { "id": "E2" },
        });
        let source = AuthorizeSourceData::from_body(&body, None);
        assert_eq!(source.team_id.as_deref(), Some("T2"));
        assert_eq!(source.enterprise_id.as_deref(), Some("E2"));
        assert_eq!(source.user_id.as_deref(), Some("U2"));
        assert!(!source.is_enterprise_install);
    }

    #[test]
    fn test_skip_list() {
        assert!(skips_authorization(&json!({ "event": { "type": "app_uninstalled" } })));
        assert!(skips_authorization(&json!({ "event": { "type": "tokens_revoked" } })));
        assert!(skips_authorization(&json!({ "event": { "type": "function_executed" } })));
        assert!(!skips_authorization(&json!({ "event": { "type": "message" } })));
        assert!(!skips_authorization(&json!({ "command": "/x" })));
    }

    #[tokio::test]
    async fn test_closure_authorize() {
        let authorize = |source: AuthorizeSourceData, _body: Value| async move {
            Ok::<_, BoxError>(AuthorizeResult {
                bot_token: source.team_id.map(|t| format!("token-{t}")),
                ..Default::default()
            })
        };
        let source = AuthorizeSourceData {
            team_id: Some("T9".into()),
            ..Default::default()
        };
        let result = authorize.authorize(&source, &json!({})).await.unwrap();
        assert_eq!(result.bot_token.as_deref(), Some("token-T9"));
    }

    #[tokio::test]
    async fn test_single_team_resolves_once() {
        let client = Arc::new(AuthTestClient {
            calls: AtomicUsize::new(0),
        });
        let auth = SingleTeamAuthorization::new("xoxb-single", client.clone());
        let source = AuthorizeSourceData::default();

        let first = auth.authorize(&source, &json!({})).await.unwrap();
        let second = auth.authorize(&source, &json!({})).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.bot_id.as_deref(), Some("B1"));
        assert_eq!(first.bot_user_id.as_deref(), Some("UBOT"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
