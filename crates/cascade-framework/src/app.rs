//! The dispatcher.
//!
//! [`AppBuilder`] is the registration phase: global middleware, listener
//! groups, scopes, collaborators and the error handler are appended to it.
//! [`AppBuilder::build`] freezes them into an [`App`], which is cheap to clone
//! and may dispatch any number of events concurrently.
//!
//! # Dispatch
//!
//! ```text
//! ReceiverEvent
//!   │ classify ──────────── unrecognised: warn, return Ok
//!   │ authorize ─────────── failure: error handler, no middleware
//!   │ seed context, ack, build args
//!   ▼
//! global middleware ─▶ listener 1 ─▶ listener 2 ─▶ ...
//!   │                  (every group tried, failures aggregated)
//!   ▼
//! error handler (at most once)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tower::ServiceExt;
use tracing::{Instrument, Span, debug, debug_span, field, warn};
use uuid::Uuid;

use cascade_core::context::keys;
use cascade_core::{
    Ack, AuthorizeResult, AuthorizeSourceData, BoundClient, BoxError, BoxedAuthorize, BoxedClient,
    BoxedMiddleware, CascadeError, CascadeResult, Classification, Context, EventCategory,
    Middleware, MiddlewareArgs, MiddlewareResult, ReceiverEvent, SingleTeamAuthorization,
    StaticAuthorization, UnconfiguredClient, classify, into_middleware, run_middleware_chain,
    skips_authorization,
};

use crate::constraints::ignore_self;
use crate::error_handler::ErrorHandler;
use crate::listener::Listener;
use crate::scope::ScopedDispatcher;
use crate::scope::assistant::Assistant;
use crate::scope::function::CustomFunction;
use crate::scope::workflow_step::WorkflowStep;
use crate::settings::AppSettings;
use crate::utilities;

// ============================================================================
// Builder
// ============================================================================

enum AuthorizeSource {
    Static,
    Token(String),
    Custom(BoxedAuthorize),
}

/// The registration phase of an [`App`].
pub struct AppBuilder {
    client: BoxedClient,
    authorize: AuthorizeSource,
    middleware: Vec<BoxedMiddleware>,
    listeners: Vec<Listener>,
    error_handler: ErrorHandler,
    settings: AppSettings,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::from_settings(AppSettings::default())
    }

    /// Starts from loaded settings.
    pub fn from_settings(settings: AppSettings) -> Self {
        Self {
            client: Arc::new(UnconfiguredClient),
            authorize: AuthorizeSource::Static,
            middleware: Vec::new(),
            listeners: Vec::new(),
            error_handler: ErrorHandler::default(),
            settings,
        }
    }

    /// Sets the API client every event's `client` is bound from.
    pub fn client(mut self, client: BoxedClient) -> Self {
        self.client = client;
        self
    }

    /// Sets the authorize collaborator.
    pub fn authorize(mut self, authorize: BoxedAuthorize) -> Self {
        self.authorize = AuthorizeSource::Custom(authorize);
        self
    }

    /// Single-workspace authorization from a bot token.
    ///
    /// Bot identifiers are resolved through `auth.test` on the first event.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.authorize = AuthorizeSource::Token(token.into());
        self
    }

    /// Appends global middleware.
    pub fn middleware<M: Middleware>(self, middleware: M) -> Self {
        self.middleware_boxed(into_middleware(middleware))
    }

    pub fn middleware_boxed(mut self, middleware: BoxedMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers a listener group.
    pub fn listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Replaces the error handler.
    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn ignore_self(mut self, enabled: bool) -> Self {
        self.settings.ignore_self = enabled;
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.settings.ack_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn attach_function_token(mut self, enabled: bool) -> Self {
        self.settings.attach_function_token = enabled;
        self
    }

    /// Installs an assistant at the current position of the global chain.
    pub fn assistant(self, assistant: Assistant) -> Self {
        self.middleware_boxed(ScopedDispatcher::new(assistant).into_middleware())
    }

    /// Installs a custom function at the current position of the global chain.
    pub fn function(self, function: CustomFunction) -> Self {
        self.middleware_boxed(ScopedDispatcher::new(function).into_middleware())
    }

    /// Installs a workflow step at the current position of the global chain.
    pub fn step(self, step: WorkflowStep) -> Self {
        self.middleware_boxed(ScopedDispatcher::new(step).into_middleware())
    }

    /// Freezes the registration.
    pub fn build(self) -> App {
        let authorize: BoxedAuthorize = match self.authorize {
            AuthorizeSource::Static => Arc::new(StaticAuthorization::default()),
            AuthorizeSource::Token(token) => {
                Arc::new(SingleTeamAuthorization::new(token, Arc::clone(&self.client)))
            }
            AuthorizeSource::Custom(authorize) => authorize,
        };

        let mut middleware = Vec::with_capacity(self.middleware.len() + 1);
        if self.settings.ignore_self {
            middleware.push(into_middleware(ignore_self()));
        }
        middleware.extend(self.middleware);

        App {
            inner: Arc::new(AppInner {
                client: self.client,
                authorize,
                middleware: middleware.into(),
                listeners: self.listeners.into(),
                error_handler: self.error_handler,
                settings: self.settings,
            }),
        }
    }
}

// ============================================================================
// App
// ============================================================================

struct AppInner {
    client: BoxedClient,
    authorize: BoxedAuthorize,
    middleware: Arc<[BoxedMiddleware]>,
    listeners: Arc<[Listener]>,
    error_handler: ErrorHandler,
    settings: AppSettings,
}

/// A frozen registry that dispatches events.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Returns the number of global middleware, built-ins and scopes included.
    pub fn middleware_count(&self) -> usize {
        self.inner.middleware.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    pub fn settings(&self) -> &AppSettings {
        &self.inner.settings
    }

    /// Processes one inbound event.
    ///
    /// Resolves `Ok` when the event was handled, skipped as unrecognised, or
    /// recovered by the error handler. Otherwise returns the error the
    /// handler handed back.
    pub async fn dispatch(&self, event: ReceiverEvent) -> CascadeResult<()> {
        let span = debug_span!("dispatch", id = %Uuid::new_v4(), category = field::Empty);
        self.process(event).instrument(span).await
    }

    async fn process(&self, event: ReceiverEvent) -> CascadeResult<()> {
        let ReceiverEvent {
            body,
            ack,
            respond,
            retry_num,
            retry_reason,
            custom_properties,
        } = event;

        let Some(Classification {
            category,
            conversation_id,
        }) = classify(&body)
        else {
            warn!("Could not determine the type of an incoming event, no listeners will be called");
            return Ok(());
        };
        Span::current().record("category", category.as_str());

        let source = AuthorizeSourceData::from_body(&body, conversation_id.clone());
        let authorization = if skips_authorization(&body) {
            debug!("Authorization skipped for this event type");
            AuthorizeResult::default()
        } else {
            match self.inner.authorize.authorize(&source, &body).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(error = %err, "Authorization of incoming event did not succeed, no listeners will be called");
                    return self
                        .inner
                        .error_handler
                        .handle(CascadeError::authorization(err), Arc::new(body), Context::new())
                        .await;
                }
            }
        };

        let context = Context::from_authorization(authorization);
        context.insert(keys::IS_ENTERPRISE_INSTALL, source.is_enterprise_install);
        if let Some(num) = retry_num {
            context.insert(keys::RETRY_NUM, num);
        }
        if let Some(reason) = retry_reason {
            context.insert(keys::RETRY_REASON, reason);
        }
        for (key, value) in custom_properties {
            context.insert(key, value);
        }
        seed_function_data(&body, category, &context);

        let client = BoundClient::for_context(
            Arc::clone(&self.inner.client),
            &context,
            self.inner.settings.attach_function_token,
        );
        let mut args = MiddlewareArgs::new(body, category, context.clone(), client.clone());

        let ack = Ack::new(ack);
        if category.is_auto_acknowledged() {
            if let Err(err) = ack.ack().await {
                return self.handle_error(err, &args).await;
            }
        } else {
            ack.watch(self.inner.settings.ack_timeout(), category.as_str());
            args.ack = Some(ack);
        }

        if category != EventCategory::Options {
            args.say = conversation_id.map(|channel| utilities::say(client.clone(), channel));
        }
        args.respond = utilities::respond(respond, &args.body, &client);
        if let Some(execution_id) = context.function_execution_id() {
            args.complete = Some(utilities::complete_function(client.clone(), Some(execution_id.clone())));
            args.fail = Some(utilities::fail_function(client, Some(execution_id)));
        }

        let listeners = Arc::clone(&self.inner.listeners);
        let listener_args = args.clone();
        let result = run_middleware_chain(Arc::clone(&self.inner.middleware), args.clone(), move || {
            run_listeners(listeners, listener_args)
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(err) => self.handle_error(err, &args).await,
        }
    }

    async fn handle_error(&self, err: BoxError, args: &MiddlewareArgs) -> CascadeResult<()> {
        let error = CascadeError::from_boxed(err);
        debug!(code = %error.code(), "Dispatch failed, invoking error handler");
        self.inner
            .error_handler
            .handle(error, Arc::clone(&args.body), args.context.clone())
            .await
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("middleware_count", &self.middleware_count())
            .field("listener_count", &self.listener_count())
            .field("error_handler", &self.inner.error_handler)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

/// Seeds function-execution data from `function_executed` events and from
/// interactivity that happens inside a function.
fn seed_function_data(body: &Value, category: EventCategory, context: &Context) {
    let (execution_id, token, inputs) = if category == EventCategory::FunctionExecution {
        let event = &body["event"];
        (
            event.get("function_execution_id"),
            event.get("bot_access_token"),
            event.get("inputs"),
        )
    } else if let Some(data) = body.get("function_data") {
        (
            data.get("execution_id"),
            body.get("bot_access_token"),
            data.get("inputs"),
        )
    } else {
        return;
    };

    for (key, value) in [
        (keys::FUNCTION_EXECUTION_ID, execution_id),
        (keys::FUNCTION_BOT_ACCESS_TOKEN, token),
        (keys::FUNCTION_INPUTS, inputs),
    ] {
        if let Some(value) = value.filter(|v| !v.is_null()) {
            context.insert(key, value.clone());
        }
    }
}

/// Runs every listener group in registration order.
///
/// A failing group does not stop the others. One failure is returned as is;
/// several are aggregated.
async fn run_listeners(listeners: Arc<[Listener]>, args: MiddlewareArgs) -> MiddlewareResult {
    let mut failures = Vec::new();
    for listener in listeners.iter() {
        if let Err(err) = listener.clone().oneshot(args.clone()).await {
            debug!(
                listener = listener.get_name().unwrap_or("unnamed"),
                error = %err,
                "Listener failed"
            );
            failures.push(err);
        }
    }

    if failures.len() > 1 {
        return Err(CascadeError::MultipleListeners {
            originals: failures,
        }
        .into());
    }
    failures.pop().map_or(Ok(()), Err)
}
