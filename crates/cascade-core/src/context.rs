//! Per-dispatch shared context.
//!
//! A single [`Context`] is created for every incoming event and threaded by
//! reference through the global chain and every listener chain of that
//! dispatch. Cloning a `Context` clones the handle, not the map: a value
//! written by middleware N is visible to middleware N+1 and to every
//! listener group that runs afterwards.
//!
//! Distinct dispatches never share a `Context`.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::authorize::AuthorizeResult;

/// Well-known context keys populated by the dispatcher.
pub mod keys {
    pub const BOT_TOKEN: &str = "bot_token";
    pub const USER_TOKEN: &str = "user_token";
    pub const APP_TOKEN: &str = "app_token";
    pub const BOT_ID: &str = "bot_id";
    pub const BOT_USER_ID: &str = "bot_user_id";
    pub const TEAM_ID: &str = "team_id";
    pub const ENTERPRISE_ID: &str = "enterprise_id";
    pub const IS_ENTERPRISE_INSTALL: &str = "is_enterprise_install";
    pub const RETRY_NUM: &str = "retry_num";
    pub const RETRY_REASON: &str = "retry_reason";
    pub const FUNCTION_EXECUTION_ID: &str = "function_execution_id";
    pub const FUNCTION_BOT_ACCESS_TOKEN: &str = "function_bot_access_token";
    pub const FUNCTION_INPUTS: &str = "function_inputs";
    pub const MATCHES: &str = "matches";
}

/// Mutable key-value map shared by every middleware of one dispatch.
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<RwLock<Map<String, Value>>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with the fields of an authorization result.
    pub fn from_authorization(auth: AuthorizeResult) -> Self {
        let ctx = Self::new();
        {
            let mut map = ctx.inner.write();
            let mut put = |key: &str, value: Option<String>| {
                if let Some(v) = value {
                    map.insert(key.to_string(), Value::String(v));
                }
            };
            put(keys::BOT_TOKEN, auth.bot_token);
            put(keys::USER_TOKEN, auth.user_token);
            put(keys::APP_TOKEN, auth.app_token);
            put(keys::BOT_ID, auth.bot_id);
            put(keys::BOT_USER_ID, auth.bot_user_id);
            put(keys::TEAM_ID, auth.team_id);
            put(keys::ENTERPRISE_ID, auth.enterprise_id);
            map.extend(auth.extra);
        }
        ctx
    }

    /// Returns a clone of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    /// Returns the string stored under `key`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.inner
            .read()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.write().insert(key.into(), value.into())
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().remove(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Returns a point-in-time copy of the whole map.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner.read().clone()
    }

    /// Returns `true` if both handles point at the same map.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ─── Well-known keys ──────────────────────────────────────────────────────

    pub fn bot_token(&self) -> Option<String> {
        self.get_str(keys::BOT_TOKEN)
    }

    pub fn user_token(&self) -> Option<String> {
        self.get_str(keys::USER_TOKEN)
    }

    pub fn app_token(&self) -> Option<String> {
        self.get_str(keys::APP_TOKEN)
    }

    pub fn bot_id(&self) -> Option<String> {
        self.get_str(keys::BOT_ID)
    }

    pub fn bot_user_id(&self) -> Option<String> {
        self.get_str(keys::BOT_USER_ID)
    }

    pub fn team_id(&self) -> Option<String> {
        self.get_str(keys::TEAM_ID)
    }

    pub fn enterprise_id(&self) -> Option<String> {
        self.get_str(keys::ENTERPRISE_ID)
    }

    pub fn is_enterprise_install(&self) -> bool {
        self.get(keys::IS_ENTERPRISE_INSTALL)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn retry_num(&self) -> Option<u64> {
        self.get(keys::RETRY_NUM).and_then(|v| v.as_u64())
    }

    pub fn retry_reason(&self) -> Option<String> {
        self.get_str(keys::RETRY_REASON)
    }

    pub fn function_execution_id(&self) -> Option<String> {
        self.get_str(keys::FUNCTION_EXECUTION_ID)
    }

    pub fn function_bot_access_token(&self) -> Option<String> {
        self.get_str(keys::FUNCTION_BOT_ACCESS_TOKEN)
    }

    pub fn function_inputs(&self) -> Option<Value> {
        self.get(keys::FUNCTION_INPUTS)
    }

    /// Capture groups of the most recent regex constraint that matched.
    ///
    /// Index 0 is the whole match; unmatched optional groups are `None`.
    pub fn matches(&self) -> Option<Vec<Option<String>>> {
        let value = self.get(keys::MATCHES)?;
        let groups = value
            .as_array()?
            .iter()
            .map(|g| g.as_str().map(str::to_string))
            .collect();
        Some(groups)
    }

    /// Stores regex capture groups under `matches`.
    pub fn set_matches(&self, groups: Vec<Option<String>>) {
        let value = groups
            .into_iter()
            .map(|g| g.map_or(Value::Null, Value::String))
            .collect::<Vec<_>>();
        self.insert(keys::MATCHES, Value::Array(value));
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.inner.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
