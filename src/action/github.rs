// Taskweave — Issue-tracker action handler (GitHub REST API)

use super::{
    optional_str, optional_string_list, path_segment, required_str, send_json, ActionError,
    ActionHandler, Params,
};
use crate::config::GitHubConfig;
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

const USER_AGENT: &str = concat!("taskweave/", env!("CARGO_PKG_VERSION"));
const MAX_REPOSITORIES: usize = 20;

pub struct GitHubHandler {
    token: String,
    api_base: String,
    client: Client,
}

impl GitHubHandler {
    pub fn new(cfg: &GitHubConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            token: cfg.token.clone(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, ActionError> {
        if self.token.is_empty() {
            return Err(ActionError::NotConfigured("GitHub token"));
        }
        Ok(self
            .client
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json"))
    }

    async fn create_issue(&self, params: &Params) -> Result<Value, ActionError> {
        let repo = repo_path(required_str(params, "repo_name")?)?;
        let body = json!({
            "title": required_str(params, "title")?,
            "body": required_str(params, "body")?,
            "labels": optional_string_list(params, "labels")?,
        });

        let issue = send_json(
            self.request(reqwest::Method::POST, &format!("/repos/{}/issues", repo))?
                .json(&body),
        )
        .await?;

        Ok(json!({
            "number": issue.get("number").cloned().unwrap_or(Value::Null),
            "url": issue.get("html_url").cloned().unwrap_or(Value::Null),
            "title": issue.get("title").cloned().unwrap_or(Value::Null),
        }))
    }

    /// Create or update a file; an existing file's sha is fetched first.
    async fn commit_file(&self, params: &Params) -> Result<Value, ActionError> {
        let repo = repo_path(required_str(params, "repo_name")?)?;
        let file_path = required_str(params, "file_path")?
            .trim_start_matches('/')
            .split('/')
            .map(|segment| path_segment("file_path", segment))
            .collect::<Result<Vec<_>, _>>()?
            .join("/");
        let content = required_str(params, "content")?;
        let message = required_str(params, "message")?;
        let branch = optional_str(params, "branch")?.unwrap_or("main");
        let path = format!("/repos/{}/contents/{}", repo, file_path);

        let existing = self
            .request(reqwest::Method::GET, &path)?
            .query(&[("ref", branch)])
            .send()
            .await?;
        let sha = match existing.status() {
            StatusCode::NOT_FOUND => None,
            s if s.is_success() => existing
                .json::<Value>()
                .await?
                .get("sha")
                .and_then(|v| v.as_str())
                .map(String::from),
            s => {
                return Err(ActionError::Api {
                    status: s.as_u16(),
                    body: existing.text().await.unwrap_or_default(),
                })
            }
        };

        let mut body = json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "branch": branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        let result = send_json(self.request(reqwest::Method::PUT, &path)?.json(&body)).await?;
        Ok(json!({
            "commit_sha": result.pointer("/commit/sha").cloned().unwrap_or(Value::Null),
            "url": result.pointer("/content/html_url").cloned().unwrap_or(Value::Null),
        }))
    }

    async fn list_repositories(&self) -> Result<Value, ActionError> {
        let repos = send_json(
            self.request(reqwest::Method::GET, "/user/repos")?
                .query(&[("per_page", MAX_REPOSITORIES.to_string())]),
        )
        .await?;

        let list: Vec<Value> = repos
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .take(MAX_REPOSITORIES)
                    .map(|r| {
                        json!({
                            "name": r.get("full_name").cloned().unwrap_or(Value::Null),
                            "description": r.get("description").cloned().unwrap_or(Value::Null),
                            "url": r.get("html_url").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Value::Array(list))
    }
}

/// `owner/repo`, each half encoded as its own path segment.
fn repo_path(repo: &str) -> Result<String, ActionError> {
    match repo.trim().split_once('/') {
        Some((owner, name)) if !name.contains('/') => Ok(format!(
            "{}/{}",
            path_segment("repo_name", owner)?,
            path_segment("repo_name", name)?
        )),
        _ => Err(ActionError::InvalidParam {
            name: "repo_name".into(),
            reason: format!("expected 'owner/repo', got '{}'", repo),
        }),
    }
}

#[async_trait]
impl ActionHandler for GitHubHandler {
    fn step_type(&self) -> &str {
        "issue-tracker"
    }

    fn aliases(&self) -> &[&str] {
        &["github"]
    }

    fn actions(&self) -> &[&str] {
        &["create_issue", "commit_file", "list_repositories"]
    }

    async fn perform(&self, action: &str, params: &Params) -> Result<Value, ActionError> {
        match action {
            "create_issue" => self.create_issue(params).await,
            "commit_file" => self.commit_file(params).await,
            "list_repositories" => self.list_repositories().await,
            other => Err(ActionError::Unsupported(other.to_string())),
        }
    }
}
