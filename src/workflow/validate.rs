// Taskweave — Structural validation of workflow definitions

use super::{Workflow, WorkflowStep, SCHEMA_VERSION};
use crate::template;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("document does not match the workflow schema: {0}")]
    Schema(String),
    #[error("unsupported schema version {found} (max {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("invalid workflow id '{0}'")]
    InvalidId(String),
    #[error("document id '{found}' does not match requested id '{expected}'")]
    IdMismatch { expected: String, found: String },
    #[error("workflow has no steps")]
    EmptySteps,
    #[error("workflow name is empty")]
    EmptyName,
    #[error("field '{field}' is empty in step '{step}'")]
    EmptyField { field: &'static str, step: String },
    #[error("step id '{0}' must start with a letter, digit or '_' and contain only letters, digits, '_', '.' or '-'")]
    InvalidStepId(String),
    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),
    #[error("step '{step}' points to unknown next_step '{target}'")]
    DanglingNextStep { step: String, target: String },
    #[error("cycle detected: step '{step}' leads back to '{target}'")]
    Cycle { step: String, target: String },
    #[error("step '{0}' is not reachable from the first step")]
    UnreachableStep(String),
}

/// Ids double as file stems, so they are restricted to a portable charset.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Check every structural invariant of a workflow.
pub fn validate(workflow: &Workflow) -> Result<(), ValidationError> {
    execution_plan(workflow).map(|_| ())
}

/// Validate and compute the traversal order.
///
/// Sequential mode runs steps in declaration order. As soon as one step
/// declares `next_step`, the chain from the first step must cover every step
/// exactly once.
pub fn execution_plan(workflow: &Workflow) -> Result<Vec<&WorkflowStep>, ValidationError> {
    if workflow.schema_version > SCHEMA_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            found: workflow.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    if !is_valid_id(&workflow.id) {
        return Err(ValidationError::InvalidId(workflow.id.clone()));
    }
    if workflow.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if workflow.steps.is_empty() {
        return Err(ValidationError::EmptySteps);
    }

    let mut ids = HashSet::new();
    for (index, step) in workflow.steps.iter().enumerate() {
        check_step_fields(index, step)?;
        if !ids.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateStepId(step.id.clone()));
        }
    }

    for step in &workflow.steps {
        if let Some(target) = &step.next_step {
            if !ids.contains(target.as_str()) {
                return Err(ValidationError::DanglingNextStep {
                    step: step.id.clone(),
                    target: target.clone(),
                });
            }
        }
    }

    if !workflow.is_explicit_chain() {
        return Ok(workflow.steps.iter().collect());
    }

    let mut plan = Vec::with_capacity(workflow.steps.len());
    let mut visited = HashSet::new();
    let mut current = workflow.steps.first();

    while let Some(step) = current {
        visited.insert(step.id.as_str());
        plan.push(step);

        current = match &step.next_step {
            Some(target) => {
                if visited.contains(target.as_str()) {
                    return Err(ValidationError::Cycle {
                        step: step.id.clone(),
                        target: target.clone(),
                    });
                }
                workflow.step(target)
            }
            None => None,
        };
    }

    if let Some(orphan) = workflow
        .steps
        .iter()
        .find(|s| !visited.contains(s.id.as_str()))
    {
        return Err(ValidationError::UnreachableStep(orphan.id.clone()));
    }

    Ok(plan)
}

fn check_step_fields(index: usize, step: &WorkflowStep) -> Result<(), ValidationError> {
    let fields = [
        ("id", &step.id),
        ("type", &step.step_type),
        ("action", &step.action),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field,
                step: if step.id.trim().is_empty() {
                    format!("#{}", index + 1)
                } else {
                    step.id.clone()
                },
            });
        }
    }
    // Outputs are published as `<id>_output`, so the id must be referenceable.
    if !template::is_identifier(&step.id) {
        return Err(ValidationError::InvalidStepId(step.id.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn workflow(steps: Vec<WorkflowStep>) -> Workflow {
        Workflow {
            schema_version: SCHEMA_VERSION,
            id: "wf".into(),
            name: "Test".into(),
            description: String::new(),
            steps,
            variables: HashMap::new(),
        }
    }

    fn ids(plan: &[&WorkflowStep]) -> Vec<String> {
        plan.iter().map(|s| s.id.clone()).collect()
    }

    #[test]
    fn test_sequential_plan() {
        let wf = workflow(vec![
            WorkflowStep::new("a", "transform", "format"),
            WorkflowStep::new("b", "transform", "format"),
        ]);
        assert_eq!(ids(&execution_plan(&wf).unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_explicit_chain_reorders() {
        let wf = workflow(vec![
            WorkflowStep::new("fetch", "mail", "list_messages").then("summarize"),
            WorkflowStep::new("save", "document-store", "create_page"),
            WorkflowStep::new("summarize", "text-generation", "summarize").then("save"),
        ]);
        assert_eq!(
            ids(&execution_plan(&wf).unwrap()),
            vec!["fetch", "summarize", "save"]
        );
    }

    #[test]
    fn test_empty_steps() {
        assert_eq!(validate(&workflow(vec![])), Err(ValidationError::EmptySteps));
    }

    #[test]
    fn test_duplicate_ids() {
        let wf = workflow(vec![
            WorkflowStep::new("a", "transform", "format"),
            WorkflowStep::new("a", "transform", "format"),
        ]);
        assert_eq!(
            validate(&wf),
            Err(ValidationError::DuplicateStepId("a".into()))
        );
    }

    #[test]
    fn test_dangling_next_step() {
        let wf = workflow(vec![WorkflowStep::new("a", "transform", "format").then("ghost")]);
        assert_eq!(
            validate(&wf),
            Err(ValidationError::DanglingNextStep {
                step: "a".into(),
                target: "ghost".into()
            })
        );
    }

    #[test]
    fn test_self_cycle() {
        let wf = workflow(vec![WorkflowStep::new("a", "transform", "format").then("a")]);
        let err = validate(&wf).unwrap_err();
        assert!(matches!(err, ValidationError::Cycle { .. }));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_longer_cycle() {
        let wf = workflow(vec![
            WorkflowStep::new("a", "transform", "format").then("b"),
            WorkflowStep::new("b", "transform", "format").then("a"),
        ]);
        assert_eq!(
            validate(&wf),
            Err(ValidationError::Cycle {
                step: "b".into(),
                target: "a".into()
            })
        );
    }

    #[test]
    fn test_partial_chain_is_rejected() {
        let wf = workflow(vec![
            WorkflowStep::new("a", "transform", "format").then("c"),
            WorkflowStep::new("b", "transform", "format"),
            WorkflowStep::new("c", "transform", "format"),
        ]);
        assert_eq!(
            validate(&wf),
            Err(ValidationError::UnreachableStep("b".into()))
        );
    }

    #[test]
    fn test_empty_fields() {
        let wf = workflow(vec![WorkflowStep::new("a", "", "format")]);
        assert_eq!(
            validate(&wf),
            Err(ValidationError::EmptyField {
                field: "type",
                step: "a".into()
            })
        );
    }

    #[test]
    fn test_invalid_ids() {
        assert!(is_valid_id("daily-digest_v2.1"));
        assert!(!is_valid_id("../etc"));
        assert!(!is_valid_id(".."));
        assert!(!is_valid_id(""));

        let mut wf = workflow(vec![WorkflowStep::new("a", "transform", "format")]);
        wf.id = "a/b".into();
        assert_eq!(validate(&wf), Err(ValidationError::InvalidId("a/b".into())));
    }

    #[test]
    fn test_step_ids_must_be_referenceable() {
        for bad in ["fetch data", "-x", ".hidden", "a{b}", "ünïcode"] {
            let wf = workflow(vec![WorkflowStep::new(bad, "transform", "format")]);
            assert_eq!(
                validate(&wf),
                Err(ValidationError::InvalidStepId(bad.to_string())),
                "{}",
                bad
            );
        }
        for good in ["fetch", "fetch_data", "step-2", "v1.fetch", "_x", "9lives"] {
            let wf = workflow(vec![WorkflowStep::new(good, "transform", "format")]);
            assert!(validate(&wf).is_ok(), "{}", good);
        }
    }

    #[test]
    fn test_future_schema_version() {
        let mut wf = workflow(vec![WorkflowStep::new("a", "transform", "format")]);
        wf.schema_version = SCHEMA_VERSION + 1;
        assert!(matches!(
            validate(&wf),
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }
}
