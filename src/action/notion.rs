// Taskweave — Document-store action handler (Notion API)

use super::{path_segment, required_str, send_json, ActionError, ActionHandler, Params};
use crate::config::NotionConfig;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

pub struct NotionHandler {
    token: String,
    api_base: String,
    version: String,
    client: Client,
}

fn paragraph(content: &str) -> Value {
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": {
            "rich_text": [{"type": "text", "text": {"content": content}}]
        }
    })
}

/// Title text of a page object, whichever property holds it.
fn page_title(page: &Value) -> Option<String> {
    page.get("properties")?
        .as_object()?
        .values()
        .find(|p| p.get("type").and_then(|t| t.as_str()) == Some("title"))?
        .get("title")?
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("plain_text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
}

impl NotionHandler {
    pub fn new(cfg: &NotionConfig) -> anyhow::Result<Self> {
        Ok(Self {
            token: cfg.token.clone(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            version: cfg.version.clone(),
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ActionError> {
        if self.token.is_empty() {
            return Err(ActionError::NotConfigured("Notion token"));
        }
        Ok(self
            .client
            .request(method, format!("{}/v1{}", self.api_base, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.version))
    }

    async fn create_page(&self, params: &Params) -> Result<Value, ActionError> {
        let body = json!({
            "parent": {"database_id": required_str(params, "parent_id")?},
            "properties": {
                "Name": {"title": [{"text": {"content": required_str(params, "title")?}}]}
            },
            "children": [paragraph(required_str(params, "content")?)],
        });
        let page = send_json(self.request(Method::POST, "/pages")?.json(&body)).await?;
        Ok(json!({
            "id": page.get("id").cloned().unwrap_or(Value::Null),
            "url": page.get("url").cloned().unwrap_or(Value::Null),
        }))
    }

    async fn append_to_page(&self, params: &Params) -> Result<Value, ActionError> {
        let page_id = path_segment("page_id", required_str(params, "page_id")?)?;
        let body = json!({"children": [paragraph(required_str(params, "content")?)]});
        let result = send_json(
            self.request(Method::PATCH, &format!("/blocks/{}/children", page_id))?
                .json(&body),
        )
        .await?;
        let block_id = result
            .pointer("/results/0/id")
            .cloned()
            .unwrap_or(Value::Null);
        Ok(json!({"id": block_id}))
    }

    async fn search_pages(&self, params: &Params) -> Result<Value, ActionError> {
        let query = params
            .get("query")
            .and_then(|q| q.as_str())
            .unwrap_or_default();
        let body = json!({
            "query": query,
            "filter": {"property": "object", "value": "page"},
        });
        let found = send_json(self.request(Method::POST, "/search")?.json(&body)).await?;

        let pages = found
            .get("results")
            .and_then(|r| r.as_array())
            .map(|items| {
                items
                    .iter()
                    .map(|p| {
                        json!({
                            "id": p.get("id").cloned().unwrap_or(Value::Null),
                            "url": p.get("url").cloned().unwrap_or(Value::Null),
                            "title": page_title(p).unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Value::Array(pages))
    }
}

#[async_trait]
impl ActionHandler for NotionHandler {
    fn step_type(&self) -> &str {
        "document-store"
    }

    fn aliases(&self) -> &[&str] {
        &["notion"]
    }

    fn actions(&self) -> &[&str] {
        &["create_page", "append_to_page", "search_pages"]
    }

    async fn perform(&self, action: &str, params: &Params) -> Result<Value, ActionError> {
        match action {
            "create_page" => self.create_page(params).await,
            "append_to_page" => self.append_to_page(params).await,
            "search_pages" => self.search_pages(params).await,
            other => Err(ActionError::Unsupported(other.to_string())),
        }
    }
}
