// Taskweave — Mail action handler (Gmail REST API, read-only)

use super::{
    optional_str, optional_u64, path_segment, required_str, send_json, ActionError, ActionHandler,
    Params,
};
use crate::config::GmailConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub struct GmailHandler {
    access_token: String,
    api_base: String,
    client: Client,
}

impl GmailHandler {
    pub fn new(cfg: &GmailConfig) -> anyhow::Result<Self> {
        Ok(Self {
            access_token: cfg.access_token.clone(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
        })
    }

    fn get(&self, path: &str) -> Result<reqwest::RequestBuilder, ActionError> {
        if self.access_token.is_empty() {
            return Err(ActionError::NotConfigured("Gmail access token"));
        }
        Ok(self
            .client
            .get(format!("{}/gmail/v1/users/me{}", self.api_base, path))
            .bearer_auth(&self.access_token))
    }

    async fn list_messages(&self, params: &Params) -> Result<Value, ActionError> {
        let max_results = optional_u64(params, "max_results")?.unwrap_or(10);
        let mut query = vec![("maxResults", max_results.to_string())];
        if let Some(q) = optional_str(params, "query")? {
            query.push(("q", q.to_string()));
        }

        let listing = send_json(self.get("/messages")?.query(&query)).await?;
        let messages = listing
            .get("messages")
            .and_then(|m| m.as_array())
            .map(|items| {
                items
                    .iter()
                    .map(|m| {
                        json!({
                            "id": m.get("id").cloned().unwrap_or(Value::Null),
                            "thread_id": m.get("threadId").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Value::Array(messages))
    }

    async fn get_message(&self, params: &Params) -> Result<Value, ActionError> {
        let id = required_str(params, "message_id")?;
        let message = send_json(
            self.get(&format!("/messages/{}", path_segment("message_id", id)?))?
                .query(&[("format", "full")]),
        )
        .await?;

        let header = |name: &str| -> Value {
            message
                .pointer("/payload/headers")
                .and_then(|h| h.as_array())
                .and_then(|headers| {
                    headers.iter().find(|h| {
                        h.get("name")
                            .and_then(|n| n.as_str())
                            .is_some_and(|n| n.eq_ignore_ascii_case(name))
                    })
                })
                .and_then(|h| h.get("value"))
                .cloned()
                .unwrap_or(Value::Null)
        };

        Ok(json!({
            "id": message.get("id").cloned().unwrap_or_else(|| json!(id)),
            "subject": header("Subject"),
            "from": header("From"),
            "date": header("Date"),
            "snippet": message.get("snippet").cloned().unwrap_or(Value::Null),
            "body": message.get("payload").map(message_body).unwrap_or_default(),
        }))
    }
}

/// Plain-text body of a message payload: the first `text/plain` part of a
/// multipart message, otherwise the payload's own body. Empty if neither
/// decodes.
fn message_body(payload: &Value) -> String {
    match payload.get("parts").and_then(|p| p.as_array()) {
        Some(parts) => parts
            .iter()
            .find_map(|part| {
                if part.get("mimeType").and_then(|m| m.as_str()) == Some("text/plain") {
                    decode_body(part)
                } else if part.get("parts").is_some() {
                    Some(message_body(part)).filter(|b| !b.is_empty())
                } else {
                    None
                }
            })
            .unwrap_or_default(),
        None => decode_body(payload).unwrap_or_default(),
    }
}

fn decode_body(part: &Value) -> Option<String> {
    let data = part.pointer("/body/data")?.as_str()?;
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl ActionHandler for GmailHandler {
    fn step_type(&self) -> &str {
        "mail"
    }

    fn aliases(&self) -> &[&str] {
        &["gmail"]
    }

    fn actions(&self) -> &[&str] {
        &["list_messages", "get_message"]
    }

    async fn perform(&self, action: &str, params: &Params) -> Result<Value, ActionError> {
        match action {
            "list_messages" => self.list_messages(params).await,
            "get_message" => self.get_message(params).await,
            other => Err(ActionError::Unsupported(other.to_string())),
        }
    }
}
