// Taskweave — Text-generation action handler

use super::{optional_f64, optional_str, optional_u64, required_str, ActionError, ActionHandler, Params};
use crate::prompt::{PromptError, PromptStore};
use crate::provider::{CompletionOptions, LLMProvider, Message};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that creates clear, concise summaries.";
const SOP_SYSTEM_PROMPT: &str =
    "You are an expert at creating clear, detailed Standard Operating Procedures.";

pub struct TextGenerationHandler {
    provider: Option<Arc<dyn LLMProvider>>,
    prompts: Option<Arc<PromptStore>>,
}

impl TextGenerationHandler {
    pub fn new(provider: Option<Arc<dyn LLMProvider>>) -> Self {
        Self {
            provider,
            prompts: None,
        }
    }

    pub fn with_prompts(mut self, prompts: Arc<PromptStore>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    async fn complete(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Value, ActionError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(ActionError::NotConfigured("text generation API key"))?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));

        let response = provider
            .chat(&messages, options)
            .await
            .map_err(|e| ActionError::Other(e.to_string()))?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                total_tokens = usage.total_tokens,
                finish_reason = %response.finish_reason,
                "Completion usage"
            );
        }
        Ok(Value::String(response.content))
    }

    async fn from_template(&self, params: &Params) -> Result<Value, ActionError> {
        let prompts = self
            .prompts
            .as_ref()
            .ok_or(ActionError::NotConfigured("prompt template store"))?;
        let template_id = required_str(params, "template_id")?;

        let template = prompts.load(template_id).await.map_err(|e| match e {
            PromptError::NotFound(id) => ActionError::InvalidParam {
                name: "template_id".into(),
                reason: format!("no prompt template '{}'", id),
            },
            other => ActionError::Other(other.to_string()),
        })?;

        let variables: HashMap<String, Value> = match params.get("variables") {
            None | Some(Value::Null) => HashMap::new(),
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            Some(_) => {
                return Err(ActionError::InvalidParam {
                    name: "variables".into(),
                    reason: "expected an object".into(),
                })
            }
        };

        let prompt = template
            .render(&variables)
            .map_err(|e| ActionError::InvalidParam {
                name: "variables".into(),
                reason: e.to_string(),
            })?;

        let options = CompletionOptions {
            model: Some(template.model.clone()),
            temperature: Some(template.temperature),
            max_tokens: optional_u64(params, "max_tokens")?,
        };
        self.complete(template.system_prompt.as_deref(), &prompt, &options)
            .await
    }
}

#[async_trait]
impl ActionHandler for TextGenerationHandler {
    fn step_type(&self) -> &str {
        "text-generation"
    }

    fn aliases(&self) -> &[&str] {
        &["openai"]
    }

    fn actions(&self) -> &[&str] {
        &[
            "generate_completion",
            "summarize",
            "generate_sop",
            "generate_from_template",
        ]
    }

    async fn perform(&self, action: &str, params: &Params) -> Result<Value, ActionError> {
        match action {
            "generate_completion" => {
                let prompt = required_str(params, "prompt")?;
                let options = CompletionOptions {
                    model: optional_str(params, "model")?.map(String::from),
                    temperature: optional_f64(params, "temperature")?,
                    max_tokens: optional_u64(params, "max_tokens")?,
                };
                self.complete(optional_str(params, "system_prompt")?, prompt, &options)
                    .await
            }
            "summarize" => {
                let text = required_str(params, "text")?;
                let max_length = optional_u64(params, "max_length")?.unwrap_or(500);
                let prompt = format!(
                    "Please provide a concise summary (max {} words) of the following text:\n\n{}",
                    max_length, text
                );
                self.complete(Some(SUMMARY_SYSTEM_PROMPT), &prompt, &CompletionOptions::default())
                    .await
            }
            "generate_sop" => {
                let task = required_str(params, "task_description")?;
                let prompt = format!(
                    "Create a detailed Standard Operating Procedure (SOP) for: {}",
                    task
                );
                self.complete(Some(SOP_SYSTEM_PROMPT), &prompt, &CompletionOptions::default())
                    .await
            }
            "generate_from_template" => self.from_template(params).await,
            other => Err(ActionError::Unsupported(other.to_string())),
        }
    }
}
