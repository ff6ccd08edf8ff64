// Taskweave — Default handler table

use super::github::GitHubHandler;
use super::gmail::GmailHandler;
use super::notion::NotionHandler;
use super::text::TextGenerationHandler;
use super::transform::TransformHandler;
use super::ActionDispatcher;
use crate::config::Config;
use crate::prompt::PromptStore;
use crate::provider::http::HTTPProvider;
use crate::provider::LLMProvider;
use std::sync::Arc;

/// Build the dispatcher for every supported integration from config.
///
/// Every handler is registered even without credentials, so a step against
/// an unconfigured integration fails with a "not configured" message rather
/// than an unknown-type error.
pub fn build_dispatcher(
    cfg: &Config,
    prompts: Option<Arc<PromptStore>>,
) -> anyhow::Result<ActionDispatcher> {
    let provider: Option<Arc<dyn LLMProvider>> = if cfg.text_generation.api_key.is_empty() {
        None
    } else {
        tracing::info!(
            model = %cfg.text_generation.model,
            api_base = %if cfg.text_generation.api_base.is_empty() { "(default)" } else { &cfg.text_generation.api_base },
            "Creating text generation provider"
        );
        Some(Arc::new(HTTPProvider::from_config(&cfg.text_generation)?) as Arc<dyn LLMProvider>)
    };

    let mut text = TextGenerationHandler::new(provider);
    if let Some(prompts) = prompts {
        text = text.with_prompts(prompts);
    }

    let mut dispatcher = ActionDispatcher::new();
    dispatcher
        .register(Arc::new(text))
        .register(Arc::new(GitHubHandler::new(&cfg.integrations.github)?))
        .register(Arc::new(NotionHandler::new(&cfg.integrations.notion)?))
        .register(Arc::new(GmailHandler::new(&cfg.integrations.gmail)?))
        .register(Arc::new(TransformHandler));

    tracing::debug!(handlers = dispatcher.count(), "Action dispatcher ready");
    Ok(dispatcher)
}
