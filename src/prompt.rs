// Taskweave — Reusable prompt templates

use crate::storage;
use crate::template::{self, TemplateError};
use crate::workflow::validate::is_valid_id;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("prompt template '{0}' not found")]
    NotFound(String),
    #[error("invalid prompt template id '{0}'")]
    InvalidId(String),
    #[error("prompt store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse prompt template: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to render prompt template: {0}")]
    Render(#[from] TemplateError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl PromptTemplate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: Option<&str>,
        user_prompt: impl Into<String>,
    ) -> Self {
        let user_prompt = user_prompt.into();
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.map(String::from),
            variables: template::placeholders(&user_prompt),
            user_prompt,
            model: default_model(),
            temperature: default_temperature(),
        }
    }

    /// Fill the user prompt's placeholders.
    pub fn render(&self, variables: &HashMap<String, Value>) -> Result<String, TemplateError> {
        template::resolve(&self.user_prompt, variables)
    }

    pub fn summary(&self) -> PromptSummary {
        PromptSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Prompt templates stored as `<dir>/<id>.json`.
pub struct PromptStore {
    dir: PathBuf,
}

impl PromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn save(&self, prompt: &PromptTemplate) -> Result<(), PromptError> {
        if !is_valid_id(&prompt.id) {
            return Err(PromptError::InvalidId(prompt.id.clone()));
        }
        let content = serde_json::to_string_pretty(prompt)?;
        storage::write_atomic(&storage::document_path(&self.dir, &prompt.id), &content).await?;
        Ok(())
    }

    pub async fn load(&self, id: &str) -> Result<PromptTemplate, PromptError> {
        if !is_valid_id(id) {
            return Err(PromptError::NotFound(id.to_string()));
        }
        let content = storage::read_optional(&storage::document_path(&self.dir, id))
            .await?
            .ok_or_else(|| PromptError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn list(&self) -> Result<Vec<PromptSummary>, PromptError> {
        let mut out = Vec::new();
        for stem in storage::list_stems(&self.dir).await? {
            match self.load(&stem).await {
                Ok(p) => out.push(p.summary()),
                Err(e) => tracing::warn!(prompt = %stem, "Skipping prompt template: {}", e),
            }
        }
        Ok(out)
    }

    pub async fn delete(&self, id: &str) -> Result<(), PromptError> {
        if is_valid_id(id) && storage::remove(&storage::document_path(&self.dir, id)).await? {
            Ok(())
        } else {
            Err(PromptError::NotFound(id.to_string()))
        }
    }

    /// Write the built-in templates, leaving existing ones untouched.
    /// Returns the ids that were written.
    pub async fn install_defaults(&self) -> Result<Vec<String>, PromptError> {
        let mut written = Vec::new();
        for prompt in default_templates() {
            match self.load(&prompt.id).await {
                Ok(_) => continue,
                Err(PromptError::NotFound(_)) => {
                    self.save(&prompt).await?;
                    written.push(prompt.id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }
}

pub fn default_templates() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate::new(
            "email_summary",
            "Email Summary",
            "Summarize email content",
            Some("You are a helpful assistant that creates concise email summaries."),
            "Please summarize this email:\n\n{{email_content}}",
        ),
        PromptTemplate::new(
            "sop_generator",
            "SOP Generator",
            "Generate Standard Operating Procedures",
            Some("You are an expert at creating clear, detailed Standard Operating Procedures."),
            "Create a detailed SOP for: {{task_description}}",
        ),
        PromptTemplate::new(
            "meeting_notes",
            "Meeting Notes",
            "Generate meeting notes from transcript",
            Some("You are an expert at organizing meeting notes."),
            "Create structured meeting notes from this transcript:\n\n{{transcript}}\n\nInclude: key points, action items, and decisions.",
        ),
        PromptTemplate::new(
            "code_review",
            "Code Review",
            "Generate code review comments",
            Some("You are an experienced software engineer reviewing code."),
            "Review this code and provide constructive feedback:\n\n{{code}}",
        ),
    ]
}
