pub mod chat;

pub use chat::{ChatCompletionsBackend, Endpoint};

use jaytem_core::config::Config;

/// Build the model backend selected by `MODEL_PROVIDER`.
pub fn backend_from_config(config: &Config) -> ChatCompletionsBackend {
    let backend = if config.model_provider == "openai" {
        ChatCompletionsBackend::openai(
            config.openai_base_url.clone(),
            config.model.clone(),
            config.openai_api_key.clone(),
        )
    } else {
        ChatCompletionsBackend::azure(
            config.azure_endpoint.clone(),
            config.azure_deployment.clone(),
            config.azure_api_version.clone(),
            config.azure_api_key.clone(),
        )
    };
    backend
        .with_sampling(config.model_temperature, config.model_max_tokens)
        .with_timeout(config.model_timeout_s)
}
