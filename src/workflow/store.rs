// Taskweave — Workflow store (one JSON document per workflow)

use super::validate::{self, is_valid_id, ValidationError};
use super::{Workflow, WorkflowError, WorkflowSummary};
use crate::storage;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub struct WorkflowStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl WorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load and fully validate a workflow definition.
    pub async fn load(&self, id: &str) -> Result<Workflow, WorkflowError> {
        if !is_valid_id(id) {
            return Err(WorkflowError::NotFound(id.to_string()));
        }

        let path = storage::document_path(&self.dir, id);
        let content = storage::read_optional(&path)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;

        let workflow = parse(&content)?;
        if workflow.id != id {
            return Err(ValidationError::IdMismatch {
                expected: id.to_string(),
                found: workflow.id,
            }
            .into());
        }

        tracing::debug!(workflow = %id, steps = workflow.steps.len(), "Loaded workflow");
        Ok(workflow)
    }

    /// Validate and persist a workflow, replacing any previous version.
    pub async fn save(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        validate::validate(workflow)?;
        let content = serde_json::to_string_pretty(workflow)?;
        let path = storage::document_path(&self.dir, &workflow.id);

        let _guard = self.write_lock.lock().await;
        storage::write_atomic(&path, &content).await?;

        tracing::info!(workflow = %workflow.id, path = %path.display(), "Saved workflow");
        Ok(())
    }

    /// Summaries of every readable, valid definition, sorted by id.
    pub async fn list(&self) -> Result<Vec<WorkflowSummary>, WorkflowError> {
        let mut summaries = Vec::new();
        for stem in storage::list_stems(&self.dir).await? {
            match self.load(&stem).await {
                Ok(workflow) => summaries.push(workflow.summary()),
                Err(e) => {
                    tracing::warn!(workflow = %stem, "Skipping workflow document: {}", e);
                }
            }
        }
        Ok(summaries)
    }

    pub async fn exists(&self, id: &str) -> bool {
        is_valid_id(id) && tokio::fs::try_exists(storage::document_path(&self.dir, id))
            .await
            .unwrap_or(false)
    }

    /// Delete a definition. Returns `NotFound` if it did not exist.
    pub async fn delete(&self, id: &str) -> Result<(), WorkflowError> {
        if !is_valid_id(id) {
            return Err(WorkflowError::NotFound(id.to_string()));
        }
        let _guard = self.write_lock.lock().await;
        if storage::remove(&storage::document_path(&self.dir, id)).await? {
            tracing::info!(workflow = %id, "Deleted workflow");
            Ok(())
        } else {
            Err(WorkflowError::NotFound(id.to_string()))
        }
    }
}

/// Parse a JSON definition, rejecting the whole document on any violation.
pub fn parse(content: &str) -> Result<Workflow, ValidationError> {
    let workflow: Workflow =
        serde_json::from_str(content).map_err(|e| ValidationError::Schema(e.to_string()))?;
    validate::validate(&workflow)?;
    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{WorkflowStep, SCHEMA_VERSION};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample(id: &str) -> Workflow {
        Workflow {
            schema_version: SCHEMA_VERSION,
            id: id.into(),
            name: format!("Workflow {}", id),
            description: "sample".into(),
            steps: vec![
                WorkflowStep::new("fetch", "mail", "list_messages")
                    .with_param("max_results", 5)
                    .then("summarize"),
                WorkflowStep::new("summarize", "text-generation", "summarize")
                    .with_param("text", "{{fetch_output}}"),
            ],
            variables: HashMap::from([("owner".to_string(), json!("ops"))]),
        }
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = WorkflowStore::new(tmp.path());
        let wf = sample("digest");

        store.save(&wf).await.unwrap();
        let loaded = store.load("digest").await.unwrap();
        assert_eq!(loaded, wf);
        assert!(store.exists("digest").await);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = WorkflowStore::new(tmp.path());
        assert!(matches!(
            store.load("nope").await,
            Err(WorkflowError::NotFound(id)) if id == "nope"
        ));
        assert!(matches!(
            store.load("../escape").await,
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_rejects_duplicate_step_ids() {
        let tmp = TempDir::new().unwrap();
        let doc = json!({
            "id": "dup", "name": "Dup", "description": "",
            "steps": [
                {"id": "a", "type": "transform", "action": "format", "params": {}},
                {"id": "a", "type": "transform", "action": "format", "params": {}}
            ],
            "variables": {}
        });
        std::fs::write(tmp.path().join("dup.json"), doc.to_string()).unwrap();

        let store = WorkflowStore::new(tmp.path());
        match store.load("dup").await {
            Err(WorkflowError::Validation(ValidationError::DuplicateStepId(id))) => {
                assert_eq!(id, "a")
            }
            other => panic!("expected duplicate id error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_rejects_self_cycle() {
        let tmp = TempDir::new().unwrap();
        let doc = json!({
            "id": "loop", "name": "Loop", "description": "",
            "steps": [{"id": "a", "type": "transform", "action": "format", "next_step": "a"}]
        });
        std::fs::write(tmp.path().join("loop.json"), doc.to_string()).unwrap();

        let store = WorkflowStore::new(tmp.path());
        let err = store.load("loop").await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::Cycle { .. })
        ));
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_and_mismatched_documents() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(
            tmp.path().join("other.json"),
            serde_json::to_string(&sample("renamed")).unwrap(),
        )
        .unwrap();

        let store = WorkflowStore::new(tmp.path());
        assert!(matches!(
            store.load("broken").await,
            Err(WorkflowError::Validation(ValidationError::Schema(_)))
        ));
        assert!(matches!(
            store.load("other").await,
            Err(WorkflowError::Validation(ValidationError::IdMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_workflow() {
        let tmp = TempDir::new().unwrap();
        let store = WorkflowStore::new(tmp.path());
        let mut wf = sample("bad");
        wf.steps.clear();

        assert!(matches!(
            store.save(&wf).await,
            Err(WorkflowError::Validation(ValidationError::EmptySteps))
        ));
        assert!(!store.exists("bad").await);
    }

    #[tokio::test]
    async fn test_list_skips_invalid_documents() {
        let tmp = TempDir::new().unwrap();
        let store = WorkflowStore::new(tmp.path());
        store.save(&sample("b")).await.unwrap();
        store.save(&sample("a")).await.unwrap();
        std::fs::write(tmp.path().join("junk.json"), "[]").unwrap();

        let list = store.list().await.unwrap();
        let ids: Vec<_> = list.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(list[0].name, "Workflow a");
    }

    #[tokio::test]
    async fn test_delete() {
        let tmp = TempDir::new().unwrap();
        let store = WorkflowStore::new(tmp.path());
        store.save(&sample("gone")).await.unwrap();

        store.delete("gone").await.unwrap();
        assert!(!store.exists("gone").await);
        assert!(matches!(
            store.delete("gone").await,
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_saves_never_tear() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(WorkflowStore::new(tmp.path()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut wf = sample("shared");
                wf.description = format!("writer {}", i);
                store.save(&wf).await.unwrap();
                // Readers interleaved with writers always see a whole document.
                store.load("shared").await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let loaded = store.load("shared").await.unwrap();
        assert!(loaded.description.starts_with("writer "));
        assert_eq!(storage::list_stems(tmp.path()).await.unwrap(), vec!["shared"]);
    }
}
