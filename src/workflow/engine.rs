// Taskweave — Workflow engine (step-by-step orchestrator)

use super::result::{ExecutionResult, StepError, StepErrorKind, StepResult};
use super::{Workflow, WorkflowError, WorkflowStep};
use crate::action::{ActionDispatcher, DispatchError};
use crate::template::{self, TemplateError, VariableScope};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Live variable scope of a single run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    vars: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Workflow defaults, overridden key-by-key by caller variables.
    pub fn seed(workflow: &Workflow, initial: HashMap<String, Value>) -> Self {
        let mut vars = workflow.variables.clone();
        vars.extend(initial);
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn record_output(&mut self, step: &WorkflowStep, output: Value) {
        self.vars.insert(step.output_key(), output);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, Value> {
        self.vars
    }
}

impl VariableScope for ExecutionContext {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs workflows against an injected dispatcher. Holds no per-run state,
/// so one engine can serve many concurrent runs.
#[derive(Clone)]
pub struct WorkflowEngine {
    dispatcher: Arc<ActionDispatcher>,
}

impl WorkflowEngine {
    pub fn new(dispatcher: Arc<ActionDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Execute a workflow to completion or first failure.
    ///
    /// Only structural problems with the definition are returned as `Err`,
    /// before any step runs. Step failures end up in the result.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        initial_variables: HashMap<String, Value>,
    ) -> Result<ExecutionResult, WorkflowError> {
        let plan = workflow.execution_plan()?;
        let run_id = uuid::Uuid::new_v4();
        let started_at = chrono::Utc::now();
        let mut context = ExecutionContext::seed(workflow, initial_variables);

        tracing::info!(
            workflow = %workflow.id,
            run_id = %run_id,
            steps = plan.len(),
            explicit_chain = workflow.is_explicit_chain(),
            "Starting workflow run"
        );

        let mut results = Vec::with_capacity(plan.len());
        let mut halted = false;

        for step in plan {
            if halted {
                tracing::debug!(run_id = %run_id, step = %step.id, "Skipping step after failure");
                results.push(StepResult::skipped(&step.id));
                continue;
            }

            let start = Instant::now();
            match self.run_step(step, &context).await {
                Ok(output) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    context.record_output(step, output.clone());
                    results.push(StepResult::succeeded(&step.id, output, elapsed));
                }
                Err(error) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    tracing::error!(
                        run_id = %run_id,
                        step = %step.id,
                        kind = ?error.kind,
                        "Step failed: {}",
                        error.message
                    );
                    results.push(StepResult::failed(&step.id, error, elapsed));
                    halted = true;
                }
            }
        }

        let result = ExecutionResult::new(
            run_id,
            workflow.id.clone(),
            results,
            started_at,
            context.into_inner(),
        );

        tracing::info!(
            workflow = %workflow.id,
            run_id = %run_id,
            status = ?result.status(),
            duration_ms = (result.finished_at() - result.started_at()).num_milliseconds(),
            "Workflow run finished"
        );

        Ok(result)
    }

    async fn run_step(
        &self,
        step: &WorkflowStep,
        context: &ExecutionContext,
    ) -> Result<Value, StepError> {
        let params = template::resolve_params(&step.params, context).map_err(StepError::from)?;

        self.dispatcher
            .dispatch(&step.step_type, &step.action, &params)
            .await
            .map_err(StepError::from)
    }
}

impl From<TemplateError> for StepError {
    fn from(e: TemplateError) -> Self {
        Self {
            kind: StepErrorKind::UnresolvedVariable,
            message: e.to_string(),
        }
    }
}

impl From<DispatchError> for StepError {
    fn from(e: DispatchError) -> Self {
        let kind = match e {
            DispatchError::UnsupportedAction { .. } => StepErrorKind::UnsupportedAction,
            DispatchError::ActionExecution { .. } => StepErrorKind::ActionExecution,
        };
        Self {
            kind,
            message: e.to_string(),
        }
    }
}
