//! Provider adapters for external language model services.
//!
//! Every provider implements [`ModelProvider`] by streaming text fragments.
//! [`build_provider`] selects one at runtime from [`AgentSettings`].
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Allow for tests"
    )
)]

use std::sync::Arc;

use nexus_core::{AgentSettings, Error, ModelProvider, ProviderKind, Result};

/// Anthropic messages provider.
pub mod anthropic;
/// Google Gemini provider.
pub mod gemini;
/// Scripted provider for tests and offline runs.
pub mod mock;
/// `OpenAI`-compatible chat completions provider.
pub mod openai;
/// Server-Sent Events parsing.
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use openai::OpenAiProvider;

/// Build the provider selected in `settings`.
///
/// # Errors
/// Returns `Error::MissingApiKey` when the selected provider has no key in the
/// config file or environment.
pub fn build_provider(settings: &AgentSettings) -> Result<Arc<dyn ModelProvider>> {
    let kind = settings.provider.kind;
    let model = settings.provider.model.clone();
    let key = || {
        settings.api_key(kind).ok_or_else(|| {
            Error::MissingApiKey(kind.api_key_env().unwrap_or("API key").to_owned())
        })
    };

    let provider: Arc<dyn ModelProvider> = match kind {
        ProviderKind::OpenAi => {
            let provider = OpenAiProvider::with_api_key(key()?)?;
            Arc::new(match model {
                Some(model) => provider.with_model(model),
                None => provider,
            })
        }
        ProviderKind::Anthropic => {
            let provider = AnthropicProvider::with_api_key(key()?)?;
            Arc::new(match model {
                Some(model) => provider.with_model(model),
                None => provider,
            })
        }
        ProviderKind::Gemini => {
            let provider = GeminiProvider::with_api_key(key()?)?;
            Arc::new(match model {
                Some(model) => provider.with_model(model),
                None => provider,
            })
        }
        ProviderKind::Mock => Arc::new(MockProvider::new()),
    };
    tracing::info!("Using {} provider", provider.name());
    Ok(provider)
}
