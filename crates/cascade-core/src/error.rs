//! Unified error types for the Cascade dispatch engine.
//!
//! Every failure that escapes a dispatch is normalised into a [`CascadeError`]
//! before it reaches the error handler, so handlers always see the same
//! `code / message / original` shape no matter where the failure started.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// The erased error type returned by middleware, utilities and collaborators.
pub type BoxError = Box<dyn StdError + Send + Sync>;

// =============================================================================
// Error Codes
// =============================================================================

/// Stable machine-readable discriminant for a [`CascadeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The authorize collaborator rejected the event.
    Authorization,
    /// A middleware called `next()` more than once.
    MultipleNextInvocation,
    /// `ack()` was called more than once for one event.
    MultipleAck,
    /// More than one listener group failed for the same event.
    MultipleListeners,
    /// A middleware required a context property that was never set.
    ContextMissingProperty,
    /// A scoped sub-dispatcher was registered with an invalid configuration.
    ScopeInitialization,
    /// An assistant event lacked the channel or thread it must carry.
    AssistantMissingProperty,
    /// `complete()` / `fail()` was used without a function execution.
    CustomFunction,
    /// Anything else, wrapped so it still carries a code.
    Unknown,
}

impl ErrorCode {
    /// Returns the wire-style string form of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorization => "cascade_authorization_error",
            Self::MultipleNextInvocation => "cascade_multiple_next_invocation_error",
            Self::MultipleAck => "cascade_multiple_ack_error",
            Self::MultipleListeners => "cascade_multiple_listener_error",
            Self::ContextMissingProperty => "cascade_context_missing_property_error",
            Self::ScopeInitialization => "cascade_scope_initialization_error",
            Self::AssistantMissingProperty => "cascade_assistant_missing_property_error",
            Self::CustomFunction => "cascade_custom_function_error",
            Self::Unknown => "cascade_unknown_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// The coded error delivered to the error handler.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// The authorize collaborator failed; no middleware ran.
    #[error("authorization of incoming event did not succeed: {original}")]
    Authorization {
        /// The error returned by the collaborator.
        #[source]
        original: BoxError,
    },

    /// `next()` was invoked a second time from the same middleware.
    #[error("next() called multiple times (middleware index {index})")]
    MultipleNextInvocation {
        /// Chain position whose continuation was reinvoked.
        index: usize,
    },

    /// The acknowledgment function ran more than once.
    #[error("ack() called multiple times for the same event")]
    MultipleAck,

    /// Several listener groups failed while handling one event.
    #[error("{} listener groups failed while handling the event", originals.len())]
    MultipleListeners {
        /// Every listener failure, in registration order.
        originals: Vec<BoxError>,
    },

    /// A middleware needed a context key that authorization never populated.
    #[error("context is missing required property `{property}`")]
    ContextMissingProperty {
        /// Name of the missing key.
        property: &'static str,
    },

    /// A scope rejected its own registration.
    #[error("{scope} initialization failed: {message}")]
    ScopeInitialization {
        /// Scope kind, e.g. `"assistant"`.
        scope: &'static str,
        /// What was wrong with the registration.
        message: String,
    },

    /// An assistant payload did not identify its thread.
    #[error("assistant event is missing required property `{property}`")]
    AssistantMissingProperty {
        /// Name of the missing field.
        property: &'static str,
    },

    /// Function completion utilities used outside a function execution.
    #[error("custom function error: {message}")]
    CustomFunction {
        /// Description of the failure.
        message: String,
    },

    /// Any non-coded failure.
    #[error("{original}")]
    Unknown {
        /// The error as it was raised.
        #[source]
        original: BoxError,
    },
}

impl CascadeError {
    /// Wraps a collaborator failure as an authorization error.
    pub fn authorization(original: impl Into<BoxError>) -> Self {
        Self::Authorization {
            original: original.into(),
        }
    }

    /// Creates a scope initialization error.
    pub fn scope_initialization(scope: &'static str, message: impl Into<String>) -> Self {
        Self::ScopeInitialization {
            scope,
            message: message.into(),
        }
    }

    /// Normalises an erased error, unwrapping it when it already carries a code.
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<CascadeError>() {
            Ok(coded) => *coded,
            Err(original) => Self::Unknown { original },
        }
    }

    /// Returns the code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Authorization { .. } => ErrorCode::Authorization,
            Self::MultipleNextInvocation { .. } => ErrorCode::MultipleNextInvocation,
            Self::MultipleAck => ErrorCode::MultipleAck,
            Self::MultipleListeners { .. } => ErrorCode::MultipleListeners,
            Self::ContextMissingProperty { .. } => ErrorCode::ContextMissingProperty,
            Self::ScopeInitialization { .. } => ErrorCode::ScopeInitialization,
            Self::AssistantMissingProperty { .. } => ErrorCode::AssistantMissingProperty,
            Self::CustomFunction { .. } => ErrorCode::CustomFunction,
            Self::Unknown { .. } => ErrorCode::Unknown,
        }
    }

    /// Returns the wrapped error for authorization and unknown failures.
    pub fn original(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Authorization { original } | Self::Unknown { original } => {
                Some(original.as_ref())
            }
            _ => None,
        }
    }

    /// Returns the aggregated listener failures, or an empty slice.
    pub fn originals(&self) -> &[BoxError] {
        match self {
            Self::MultipleListeners { originals } => originals,
            _ => &[],
        }
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for platform API calls made through a [`Client`](crate::Client).
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The platform answered with `ok: false`.
    #[error("API call `{method}` failed: {error}")]
    Platform {
        /// The API method that was called.
        method: String,
        /// The error string reported by the platform.
        error: String,
    },
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(String),
    /// Failed to serialize or deserialize a payload.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for dispatch operations.
pub type CascadeResult<T> = Result<T, CascadeError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
