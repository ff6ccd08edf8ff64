// Taskweave — Workflow file import (JSON / YAML)

use super::validate::{self, ValidationError};
use super::{store, Workflow, WorkflowError};
use std::path::Path;

/// Parse a workflow definition file for import.
///
/// `.yaml`/`.yml` files are accepted alongside JSON; both go through the
/// same schema and structural validation.
pub fn parse_workflow_file(path: &Path) -> Result<Workflow, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );

    if is_yaml {
        Ok(parse_yaml(&content)?)
    } else {
        Ok(store::parse(&content)?)
    }
}

pub fn parse_yaml(content: &str) -> Result<Workflow, ValidationError> {
    let workflow: Workflow =
        serde_yaml::from_str(content).map_err(|e| ValidationError::Schema(e.to_string()))?;
    validate::validate(&workflow)?;
    Ok(workflow)
}
