// Taskweave — Workflow definitions

pub mod engine;
pub mod parser;
pub mod result;
pub mod store;
pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

pub use engine::{ExecutionContext, WorkflowEngine};
pub use result::{ExecutionResult, RunStatus, StepError, StepErrorKind, StepResult, StepStatus};
pub use store::WorkflowStore;
pub use validate::ValidationError;

/// Highest document schema version this build understands.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("workflow '{0}' not found")]
    NotFound(String),
    #[error("invalid workflow: {0}")]
    Validation(#[from] ValidationError),
    #[error("workflow store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize workflow: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workflow {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub action: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

/// Listing entry for discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Workflow {
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }

    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// True when any step names a successor, which switches traversal from
    /// declaration order to following the chain.
    pub fn is_explicit_chain(&self) -> bool {
        self.steps.iter().any(|s| s.next_step.is_some())
    }

    /// Validate and return the steps in the order they will run.
    pub fn execution_plan(&self) -> Result<Vec<&WorkflowStep>, ValidationError> {
        validate::execution_plan(self)
    }
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, step_type: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            step_type: step_type.into(),
            action: action.into(),
            params: HashMap::new(),
            next_step: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next_step = Some(next.into());
        self
    }

    /// Context key under which this step's output is published.
    pub fn output_key(&self) -> String {
        format!("{}_output", self.id)
    }
}
