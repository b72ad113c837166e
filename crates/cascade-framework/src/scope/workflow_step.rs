//! The workflow step scope.
//!
//! A [`WorkflowStep`] claims the three events of a step's lifecycle for one
//! `callback_id`:
//!
//! - **edit**: the builder opened the step's configuration (`workflow_step_edit` action)
//! - **save**: the configuration modal was submitted (`view_submission` of a `workflow_step` view)
//! - **execute**: a workflow reached the step (`workflow_step_execute` event)

use std::sync::Arc;

use serde_json::{Value, json};

use cascade_core::{
    BoundClient, BoxError, BoxedMiddleware, CascadeError, CascadeResult, EventCategory,
    Middleware, MiddlewareArgs, StepUtilities, Utility, into_middleware,
};

use super::{Scope, freeze};
use crate::pattern::Pattern;

/// Sub-events of the workflow step scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Edit,
    Save,
    Execute,
}

/// A registered workflow step.
pub struct WorkflowStep {
    callback_id: Pattern,
    edit: Arc<[BoxedMiddleware]>,
    save: Arc<[BoxedMiddleware]>,
    execute: Arc<[BoxedMiddleware]>,
}

impl WorkflowStep {
    pub fn builder(callback_id: impl Into<Pattern>) -> WorkflowStepBuilder {
        WorkflowStepBuilder {
            callback_id: callback_id.into(),
            edit: Vec::new(),
            save: Vec::new(),
            execute: Vec::new(),
        }
    }
}

/// Collects the three middleware lists of a [`WorkflowStep`].
pub struct WorkflowStepBuilder {
    callback_id: Pattern,
    edit: Vec<BoxedMiddleware>,
    save: Vec<BoxedMiddleware>,
    execute: Vec<BoxedMiddleware>,
}

impl WorkflowStepBuilder {
    pub fn edit<M: Middleware>(mut self, middleware: M) -> Self {
        self.edit.push(into_middleware(middleware));
        self
    }

    pub fn save<M: Middleware>(mut self, middleware: M) -> Self {
        self.save.push(into_middleware(middleware));
        self
    }

    pub fn execute<M: Middleware>(mut self, middleware: M) -> Self {
        self.execute.push(into_middleware(middleware));
        self
    }

    /// Fails unless every lifecycle event has at least one middleware.
    pub fn build(self) -> CascadeResult<WorkflowStep> {
        for (list, name) in [
            (&self.edit, "edit"),
            (&self.save, "save"),
            (&self.execute, "execute"),
        ] {
            if list.is_empty() {
                return Err(CascadeError::scope_initialization(
                    WorkflowStep::NAME,
                    format!("`{name}` requires at least one middleware"),
                ));
            }
        }
        Ok(WorkflowStep {
            callback_id: self.callback_id,
            edit: freeze(self.edit),
            save: freeze(self.save),
            execute: freeze(self.execute),
        })
    }
}

impl Scope for WorkflowStep {
    type Kind = StepEvent;
    const NAME: &'static str = "workflow_step";

    fn sub_event(&self, args: &MiddlewareArgs) -> Option<StepEvent> {
        let body_type = args.body.get("type").and_then(Value::as_str);
        match args.category {
            EventCategory::Action if body_type == Some("workflow_step_edit") => {
                Some(StepEvent::Edit)
            }
            EventCategory::ViewAction
                if body_type == Some("view_submission")
                    && args.payload.get("type").and_then(Value::as_str)
                        == Some("workflow_step") =>
            {
                Some(StepEvent::Save)
            }
            EventCategory::Event if args.payload_type() == Some("workflow_step_execute") => {
                Some(StepEvent::Execute)
            }
            _ => None,
        }
    }

    fn matches_constraints(&self, kind: StepEvent, args: &MiddlewareArgs) -> bool {
        // Edit reads the body, save reads the view, execute reads the event.
        let callback_id = match kind {
            StepEvent::Edit => args.body.get("callback_id"),
            StepEvent::Save | StepEvent::Execute => args.payload.get("callback_id"),
        };
        callback_id
            .and_then(Value::as_str)
            .is_some_and(|id| self.callback_id.match_exact(id).is_some())
    }

    fn middleware(&self, kind: StepEvent) -> Arc<[BoxedMiddleware]> {
        match kind {
            StepEvent::Edit => Arc::clone(&self.edit),
            StepEvent::Save => Arc::clone(&self.save),
            StepEvent::Execute => Arc::clone(&self.execute),
        }
    }

    fn augment(&self, kind: StepEvent, args: &mut MiddlewareArgs) -> CascadeResult<()> {
        let client = args.client.clone();
        match kind {
            StepEvent::Edit => {
                let trigger_id = string_at(&args.body, "/trigger_id");
                let callback_id = string_at(&args.body, "/callback_id");
                args.step = Some(StepUtilities {
                    configure: Some(configure(client, trigger_id, callback_id)),
                    update: None,
                });
            }
            StepEvent::Save => {
                let edit_id = string_at(&args.body, "/workflow_step/workflow_step_edit_id");
                args.step = Some(StepUtilities {
                    configure: None,
                    update: Some(update(client, edit_id)),
                });
            }
            StepEvent::Execute => {
                let execute_id = string_at(&args.payload, "/workflow_step/workflow_step_execute_id");
                args.complete = Some(step_call(
                    "complete",
                    "workflows.stepCompleted",
                    "outputs",
                    client.clone(),
                    execute_id.clone(),
                ));
                args.fail = Some(step_call(
                    "fail",
                    "workflows.stepFailed",
                    "error",
                    client,
                    execute_id,
                ));
            }
        }
        Ok(())
    }
}

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

fn missing(property: &str) -> BoxError {
    format!("workflow step event carries no `{property}`").into()
}

// ============================================================================
// Utilities
// ============================================================================

/// `views.open` with a `workflow_step` view for the step being edited.
fn configure(client: BoundClient, trigger_id: Option<String>, callback_id: Option<String>) -> Utility {
    Utility::new("configure", move |input| {
        open_configuration(client.clone(), trigger_id.clone(), callback_id.clone(), input)
    })
}

async fn open_configuration(
    client: BoundClient,
    trigger_id: Option<String>,
    callback_id: Option<String>,
    input: Value,
) -> Result<Value, BoxError> {
    let trigger_id = trigger_id.ok_or_else(|| missing("trigger_id"))?;
    let mut view = match input {
        Value::Object(map) => Value::Object(map),
        _ => json!({}),
    };
    view["type"] = json!("workflow_step");
    if let Some(callback_id) = callback_id {
        view["callback_id"] = json!(callback_id);
    }
    let params = json!({ "trigger_id": trigger_id, "view": view });
    Ok(client.call("views.open", params).await?)
}

/// `workflows.updateStep` for the edit that produced the submission.
fn update(client: BoundClient, edit_id: Option<String>) -> Utility {
    Utility::new("update", move |input| {
        update_step(client.clone(), edit_id.clone(), input)
    })
}

async fn update_step(
    client: BoundClient,
    edit_id: Option<String>,
    input: Value,
) -> Result<Value, BoxError> {
    let edit_id = edit_id.ok_or_else(|| missing("workflow_step_edit_id"))?;
    let mut params = match input {
        Value::Object(map) => Value::Object(map),
        _ => json!({}),
    };
    params["workflow_step_edit_id"] = json!(edit_id);
    Ok(client.call("workflows.updateStep", params).await?)
}

/// `workflows.stepCompleted` / `workflows.stepFailed` for the running step.
///
/// A bare input value is sent as `field`.
fn step_call(
    name: &'static str,
    method: &'static str,
    field: &'static str,
    client: BoundClient,
    execute_id: Option<String>,
) -> Utility {
    Utility::new(name, move |input| {
        finish_step(client.clone(), method, field, execute_id.clone(), input)
    })
}

async fn finish_step(
    client: BoundClient,
    method: &'static str,
    field: &'static str,
    execute_id: Option<String>,
    input: Value,
) -> Result<Value, BoxError> {
    let execute_id = execute_id.ok_or_else(|| missing("workflow_step_execute_id"))?;
    let mut params = match input {
        Value::Object(map) => Value::Object(map),
        Value::Null => json!({}),
        other => json!({ field: other }),
    };
    params["workflow_step_execute_id"] = json!(execute_id);
    Ok(client.call(method, params).await?)
}
