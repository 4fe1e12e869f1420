//! LLM integration for Astro Assist.
//!
//! Replies are generated by a local Ollama model. The `LlmProvider` trait
//! keeps the generation gateway independent of the backend so tests can
//! substitute scripted providers.

pub mod ollama;
pub mod provider;

pub use ollama::OllamaProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Ask the model to reason before answering (stripped from replies).
    pub enable_thinking: bool,
    /// Per-request ceiling. Kept below the queue lease.
    pub timeout: Duration,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    tracing::info!("Using Ollama at {} (model: {})", config.base_url, config.model);
    Ok(Arc::new(OllamaProvider::new(
        &config.base_url,
        &config.model,
        config.timeout,
    )?))
}
