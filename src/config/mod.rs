// Taskweave — Workflow automation engine in Rust
// License: Apache-2.0

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("home directory not found")]
    NoHomeDir,
    #[error("workspace path is invalid or inaccessible: {0}")]
    InvalidWorkspace(String),
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub text_generation: TextGenerationConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace")]
    pub root: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace(),
        }
    }
}

fn default_workspace() -> String {
    "~/.taskweave/workspace".to_string()
}

// ---------------------------------------------------------------------------
// Text generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextGenerationConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub proxy: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for TextGenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: String::new(),
            proxy: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_retries() -> usize {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}

// ---------------------------------------------------------------------------
// Integrations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub notion: NotionConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_github_base")]
    pub api_base: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: default_github_base(),
        }
    }
}

fn default_github_base() -> String {
    "https://api.github.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_notion_base")]
    pub api_base: String,
    #[serde(default = "default_notion_version")]
    pub version: String,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: default_notion_base(),
            version: default_notion_version(),
        }
    }
}

fn default_notion_base() -> String {
    "https://api.notion.com".to_string()
}
fn default_notion_version() -> String {
    "2022-06-28".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    /// OAuth access token; obtaining it is left to the operator.
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_gmail_base")]
    pub api_base: String,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            api_base: default_gmail_base(),
        }
    }
}

fn default_gmail_base() -> String {
    "https://gmail.googleapis.com".to_string()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a JSON file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply environment variable overrides (prefix: TASKWEAVE_)
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TASKWEAVE_WORKSPACE") {
            self.workspace.root = v;
        }
        if let Ok(v) = std::env::var("TASKWEAVE_TEXT_GENERATION_API_KEY") {
            self.text_generation.api_key = v;
        }
        if let Ok(v) = std::env::var("TASKWEAVE_TEXT_GENERATION_API_BASE") {
            self.text_generation.api_base = v;
        }
        if let Ok(v) = std::env::var("TASKWEAVE_TEXT_GENERATION_MODEL") {
            self.text_generation.model = v;
        }
        if let Ok(v) = std::env::var("TASKWEAVE_TEXT_GENERATION_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                self.text_generation.temperature = n;
            }
        }
        if let Ok(v) = std::env::var("TASKWEAVE_GITHUB_TOKEN") {
            self.integrations.github.token = v;
        }
        if let Ok(v) = std::env::var("TASKWEAVE_NOTION_TOKEN") {
            self.integrations.notion.token = v;
        }
        if let Ok(v) = std::env::var("TASKWEAVE_GMAIL_ACCESS_TOKEN") {
            self.integrations.gmail.access_token = v;
        }
    }

    /// Resolve the workspace path, expanding `~` to home directory.
    pub fn workspace_path(&self) -> Result<PathBuf, ConfigError> {
        let ws = &self.workspace.root;
        if let Some(stripped) = ws.strip_prefix('~') {
            let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
            Ok(home.join(ws.strip_prefix("~/").unwrap_or(stripped)))
        } else {
            Ok(PathBuf::from(ws))
        }
    }

    pub fn workflows_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.workspace_path()?.join("workflows"))
    }

    pub fn prompts_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.workspace_path()?.join("prompts"))
    }

    /// Get the default config file path: ~/.taskweave/config.json
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".taskweave").join("config.json"))
    }

    /// Integrations that have credentials configured, by step type.
    pub fn configured_integrations(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.text_generation.api_key.is_empty() {
            out.push("text-generation");
        }
        if !self.integrations.github.token.is_empty() {
            out.push("issue-tracker");
        }
        if !self.integrations.notion.token.is_empty() {
            out.push("document-store");
        }
        if !self.integrations.gmail.access_token.is_empty() {
            out.push("mail");
        }
        out
    }

    /// Validate configuration for basic correctness.
    ///
    /// Missing credentials are only warned about: a workflow that never
    /// touches an integration does not need it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ws = self.workspace_path()?;
        if ws.as_os_str().is_empty() || ws.parent().is_none() {
            return Err(ConfigError::InvalidWorkspace(
                ws.to_string_lossy().to_string(),
            ));
        }

        let configured = self.configured_integrations();
        for step_type in ["text-generation", "issue-tracker", "document-store", "mail"] {
            if !configured.contains(&step_type) {
                tracing::warn!(step_type = %step_type, "Integration has no credentials configured");
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
