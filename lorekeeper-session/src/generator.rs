//! Builds the generator client and prompt set from configuration.

use lorekeeper_core::config::LlmConfig;
use lorekeeper_llm::prompt::PromptEngine;
use lorekeeper_llm::{LlmClient, LlmError, LlmProvider};
use tracing::{info, warn};

/// Build the configured client.
///
/// A provider that needs an API key but finds none in `api_key_env` yields
/// a client with no backend: every turn then uses fallback content.
///
/// # Errors
/// Returns [`LlmError::ConfigError`] for an unknown provider name.
pub fn build_client(config: &LlmConfig) -> Result<LlmClient, LlmError> {
    let base_url = config.base_url.clone();
    let provider = match config.provider.trim().to_ascii_lowercase().as_str() {
        "none" => LlmProvider::None,
        "ollama" => LlmProvider::Ollama { base_url },
        "gemini" => match api_key(config) {
            Some(api_key) => LlmProvider::Gemini { base_url, api_key },
            None => LlmProvider::None,
        },
        "openai" => match api_key(config) {
            Some(api_key) => LlmProvider::OpenAiCompatible { base_url, api_key },
            None => LlmProvider::None,
        },
        other => {
            return Err(LlmError::ConfigError(format!("unknown LLM provider '{other}'")));
        }
    };

    let client = LlmClient::new(
        provider,
        config.narrator_model.clone(),
        config.assistant_model.clone(),
        config.max_retries,
    );
    if client.is_available() {
        info!(provider = %config.provider, model = %config.narrator_model, "Narrative generator configured");
    } else {
        warn!(provider = %config.provider, "No narrative generator available; every turn will use fallback content");
    }
    Ok(client)
}

fn api_key(config: &LlmConfig) -> Option<String> {
    let key = std::env::var(&config.api_key_env).ok().filter(|k| !k.trim().is_empty());
    if key.is_none() {
        warn!(env = %config.api_key_env, "API key environment variable is not set");
    }
    key
}

/// Built-in prompts, overridden from `prompt_dir` when configured.
///
/// A broken prompt directory is logged and ignored.
#[must_use]
pub fn load_prompts(config: &LlmConfig) -> PromptEngine {
    let Some(dir) = &config.prompt_dir else {
        return PromptEngine::builtin();
    };
    PromptEngine::from_directory(dir).unwrap_or_else(|e| {
        warn!(error = %e, "Falling back to built-in prompts");
        PromptEngine::builtin()
    })
}
