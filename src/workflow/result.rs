// Taskweave — Execution results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    UnresolvedVariable,
    UnsupportedAction,
    ActionExecution,
}

/// Why a step failed, captured instead of propagated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl StepResult {
    pub fn succeeded(step_id: impl Into<String>, output: Value, duration_ms: u64) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Succeeded,
            output: Some(output),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(step_id: impl Into<String>, error: StepError, duration_ms: u64) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error),
            duration_ms,
        }
    }

    pub fn skipped(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            output: None,
            error: None,
            duration_ms: 0,
        }
    }
}

/// Finished record of one run. Built only by the engine; read-only after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    run_id: Uuid,
    workflow_id: String,
    status: RunStatus,
    steps: Vec<StepResult>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    context: HashMap<String, Value>,
}

impl ExecutionResult {
    pub(crate) fn new(
        run_id: Uuid,
        workflow_id: String,
        steps: Vec<StepResult>,
        started_at: DateTime<Utc>,
        context: HashMap<String, Value>,
    ) -> Self {
        let status = if steps.iter().all(|s| s.status == StepStatus::Succeeded) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        Self {
            run_id,
            workflow_id,
            status,
            steps,
            started_at,
            finished_at: Utc::now(),
            context,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn step(&self, step_id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// The step that halted the run, if any.
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Variables and step outputs as they stood when the run ended.
    pub fn context(&self) -> &HashMap<String, Value> {
        &self.context
    }

    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.step(step_id).and_then(|s| s.output.as_ref())
    }
}
