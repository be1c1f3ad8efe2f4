use std::sync::Arc;

use adk_rust::model::RetryConfig;
use adk_rust::prelude::*;
use adk_rust::{BeforeModelCallback, GenerateContentConfig};
use anyhow::{Context, Result};

use crate::config::RuntimeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    VertexAi,
    GeminiApi,
}

impl ModelBackend {
    pub fn label(self) -> &'static str {
        match self {
            ModelBackend::VertexAi => "vertex-ai",
            ModelBackend::GeminiApi => "gemini-api",
        }
    }
}

pub fn validate_model_name(model_name: &str) -> Result<()> {
    if model_name.starts_with("gemini") {
        return Ok(());
    }
    Err(anyhow::anyhow!(
        "model '{}' is not a Gemini model. This build targets Gemini backends only.",
        model_name
    ))
}

pub fn google_api_key() -> Option<String> {
    crate::config::env_nonempty("GOOGLE_API_KEY")
        .or_else(|| crate::config::env_nonempty("GEMINI_API_KEY"))
}

/// Builds the Gemini model for the configured backend. Vertex AI uses
/// Application Default Credentials; the public API uses GOOGLE_API_KEY.
pub fn resolve_model(cfg: &RuntimeConfig) -> Result<(Arc<dyn Llm>, ModelBackend, String)> {
    let model_name = cfg.model.clone();
    validate_model_name(&model_name)?;

    let (mut model, backend) = if cfg.use_vertex {
        let project = cfg.project.as_deref().context(
            "GOOGLE_CLOUD_PROJECT is required when GOOGLE_GENAI_USE_VERTEXAI selects Vertex AI",
        )?;
        let model = GeminiModel::new_google_cloud_adc(project, &cfg.location, &model_name)
            .context("failed to initialize the Vertex AI Gemini backend (check ADC credentials)")?;
        (model, ModelBackend::VertexAi)
    } else {
        let api_key = google_api_key().context(
            "GOOGLE_API_KEY is required for the Gemini API backend \
             (or set GOOGLE_GENAI_USE_VERTEXAI=1 to use Vertex AI with ADC)",
        )?;
        let model = GeminiModel::new(api_key, model_name.clone())
            .context("failed to initialize the Gemini API backend")?;
        (model, ModelBackend::GeminiApi)
    };

    model.set_retry_config(RetryConfig::default().with_max_retries(3));
    Ok((Arc::new(model), backend, model_name))
}

/// Per-request generation tuning. Agent definitions stay free of runtime
/// numbers; temperature/top_p ride in through the model callback instead.
pub fn tuning_callback(temperature: Option<f32>, top_p: Option<f32>) -> BeforeModelCallback {
    Box::new(move |_ctx, mut request| {
        Box::pin(async move {
            if temperature.is_some() || top_p.is_some() {
                let config = request
                    .config
                    .get_or_insert_with(GenerateContentConfig::default);
                if config.temperature.is_none() {
                    config.temperature = temperature;
                }
                if config.top_p.is_none() {
                    config.top_p = top_p;
                }
            }
            Ok(BeforeModelResult::Continue(request))
        })
    })
}
