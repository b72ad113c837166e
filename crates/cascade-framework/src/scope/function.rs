//! The custom function scope.
//!
//! A [`CustomFunction`] claims `function_executed` events for one
//! `callback_id` and attaches `complete` / `fail` bound to the execution.

use std::sync::Arc;

use serde_json::Value;

use cascade_core::{
    BoxedMiddleware, CascadeError, CascadeResult, EventCategory, Middleware, MiddlewareArgs,
    into_middleware,
};

use super::{Scope, freeze};
use crate::pattern::Pattern;
use crate::utilities::{complete_function, fail_function};

/// A registered custom function.
pub struct CustomFunction {
    callback_id: Pattern,
    middleware: Arc<[BoxedMiddleware]>,
}

impl CustomFunction {
    pub fn builder(callback_id: impl Into<Pattern>) -> CustomFunctionBuilder {
        CustomFunctionBuilder {
            callback_id: callback_id.into(),
            middleware: Vec::new(),
        }
    }
}

/// Collects the middleware of a [`CustomFunction`].
pub struct CustomFunctionBuilder {
    callback_id: Pattern,
    middleware: Vec<BoxedMiddleware>,
}

impl CustomFunctionBuilder {
    pub fn handler<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(into_middleware(middleware));
        self
    }

    pub fn build(self) -> CascadeResult<CustomFunction> {
        if self.middleware.is_empty() {
            return Err(CascadeError::scope_initialization(
                CustomFunction::NAME,
                "a custom function requires at least one middleware",
            ));
        }
        Ok(CustomFunction {
            callback_id: self.callback_id,
            middleware: freeze(self.middleware),
        })
    }
}

impl Scope for CustomFunction {
    type Kind = ();
    const NAME: &'static str = "function";

    fn sub_event(&self, args: &MiddlewareArgs) -> Option<()> {
        (args.category == EventCategory::FunctionExecution).then_some(())
    }

    fn matches_constraints(&self, _kind: (), args: &MiddlewareArgs) -> bool {
        args.payload
            .pointer("/function/callback_id")
            .and_then(Value::as_str)
            .is_some_and(|id| self.callback_id.match_exact(id).is_some())
    }

    fn middleware(&self, _kind: ()) -> Arc<[BoxedMiddleware]> {
        Arc::clone(&self.middleware)
    }

    fn augment(&self, _kind: (), args: &mut MiddlewareArgs) -> CascadeResult<()> {
        let execution_id = args.context.function_execution_id().or_else(|| {
            args.payload
                .get("function_execution_id")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        args.complete = Some(complete_function(args.client.clone(), execution_id.clone()));
        args.fail = Some(fail_function(args.client.clone(), execution_id));
        Ok(())
    }
}
