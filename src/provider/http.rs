// Taskweave — HTTP-based LLM provider (OpenAI-compatible)

use super::*;
use crate::config::TextGenerationConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// HTTPProvider speaks the OpenAI-compatible chat completions API.
pub struct HTTPProvider {
    api_key: String,
    api_base: String,
    client: Client,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
    max_retries: usize,
    retry_delay_ms: u64,
}

impl HTTPProvider {
    pub fn new(
        api_key: String,
        api_base: String,
        proxy: Option<&str>,
        model: String,
    ) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30));

        if let Some(proxy_url) = proxy {
            if !proxy_url.is_empty() {
                builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
            }
        }

        let base = if api_base.is_empty() {
            if api_key.starts_with("sk-or-") {
                "https://openrouter.ai/api/v1".to_string()
            } else if api_key.starts_with("gsk_") {
                "https://api.groq.com/openai/v1".to_string()
            } else {
                "https://api.openai.com/v1".to_string()
            }
        } else {
            api_base
        };

        Ok(Self {
            api_key,
            api_base: base,
            client: builder.build()?,
            model,
            temperature: 0.7,
            max_tokens: None,
            max_retries: 3,
            retry_delay_ms: 1000,
        })
    }

    pub fn from_config(cfg: &TextGenerationConfig) -> anyhow::Result<Self> {
        let mut provider = Self::new(
            cfg.api_key.clone(),
            cfg.api_base.clone(),
            Some(cfg.proxy.as_str()),
            cfg.model.clone(),
        )?;
        provider.temperature = cfg.temperature;
        provider.max_tokens = cfg.max_tokens;
        provider.max_retries = cfg.max_retries;
        provider.retry_delay_ms = cfg.retry_delay_ms;
        Ok(provider)
    }
}

#[async_trait]
impl LLMProvider for HTTPProvider {
    async fn chat(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> anyhow::Result<LLMResponse> {
        let use_model = options.model.as_deref().unwrap_or(&self.model);
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));

        let mut body = json!({
            "model": use_model,
            "messages": messages,
            "temperature": options.temperature.unwrap_or(self.temperature),
        });
        if let Some(max_tokens) = options.max_tokens.or(self.max_tokens.map(u64::from)) {
            body["max_tokens"] = json!(max_tokens);
        }

        // Transient-failure retry is internal to the provider; the workflow
        // engine itself never retries a step.
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::info!(
                    attempt = attempt,
                    "Retrying LLM request after {}ms delay",
                    self.retry_delay_ms
                );
                tokio::time::sleep(Duration::from_millis(self.retry_delay_ms)).await;
            }

            tracing::debug!(
                url = %url,
                model = %use_model,
                attempt = attempt,
                "Sending LLM request"
            );

            let res = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match res {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let response_body = response.text().await?;
                        tracing::debug!(status = %status, body_len = response_body.len(), "LLM response received");
                        return parse_response(&response_body);
                    }

                    let is_transient = status.is_server_error() || status.as_u16() == 429;
                    let response_body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "could not read body".to_string());

                    if is_transient && attempt < self.max_retries {
                        tracing::warn!(status = %status, attempt = attempt, "Transient LLM API error: {}", response_body);
                        last_error = Some(anyhow::anyhow!(
                            "LLM API error ({}): {}",
                            status,
                            response_body
                        ));
                        continue;
                    } else {
                        anyhow::bail!("LLM API error ({}): {}", status, response_body);
                    }
                }
                Err(e) if attempt < self.max_retries => {
                    tracing::warn!(error = %e, attempt = attempt, "Network error during LLM request");
                    last_error = Some(anyhow::Error::from(e));
                    continue;
                }
                Err(e) => return Err(anyhow::Error::from(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("LLM request failed after {} attempts", self.max_retries + 1)
        }))
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

/// Parse an OpenAI-compatible chat completion response.
fn parse_response(body: &str) -> anyhow::Result<LLMResponse> {
    let v: serde_json::Value = serde_json::from_str(body)?;

    if let Some(err) = v.get("error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        anyhow::bail!("LLM API error: {}", msg);
    }

    let choice = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow::anyhow!("No choices in LLM response"))?;

    let message = choice
        .get("message")
        .ok_or_else(|| anyhow::anyhow!("No message in choice"))?;

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|f| f.as_str())
        .unwrap_or("stop")
        .to_string();

    let usage = v.get("usage").map(|u| UsageInfo {
        prompt_tokens: u.get("prompt_tokens").and_then(|n| n.as_u64()).unwrap_or(0) as usize,
        completion_tokens: u
            .get("completion_tokens")
            .and_then(|n| n.as_u64())
            .unwrap_or(0) as usize,
        total_tokens: u.get("total_tokens").and_then(|n| n.as_u64()).unwrap_or(0) as usize,
    });

    Ok(LLMResponse {
        content,
        finish_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_response() {
        let json = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;

        let resp = parse_response(json).unwrap();
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.finish_reason, "stop");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_length_truncated_response() {
        let json = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": null},
                "finish_reason": "length"
            }]
        }"#;
        let resp = parse_response(json).unwrap();
        assert_eq!(resp.content, "");
        assert_eq!(resp.finish_reason, "length");
        assert!(resp.usage.is_none());
    }

    #[test]
    fn test_parse_error_response() {
        let json = r#"{"error": {"message": "Invalid API key", "type": "auth_error"}}"#;
        let result = parse_response(json);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid API key"));
    }

    #[test]
    fn test_parse_no_choices() {
        assert!(parse_response(r#"{"choices": []}"#).is_err());
    }

    #[test]
    fn test_default_api_base_detection() {
        let p = HTTPProvider::new("sk-or-abc".into(), String::new(), None, "m".into()).unwrap();
        assert_eq!(p.api_base, "https://openrouter.ai/api/v1");
        let p = HTTPProvider::new("sk-abc".into(), String::new(), None, "m".into()).unwrap();
        assert_eq!(p.api_base, "https://api.openai.com/v1");
        assert_eq!(p.default_model(), "m");
    }
}
