use super::Analyzer;
use crate::codec::jpeg_base64;
use crate::config::PipelineConfig;
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde_json::{json, Value};
use std::sync::Arc;

const UPLOAD_JPEG_QUALITY: u8 = 90;

/// Google Gemini `generateContent` over REST
pub struct GeminiAnalyzer {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
    config: Arc<PipelineConfig>,
}

impl GeminiAnalyzer {
    /// `Ok(None)` when no model is configured or the key variable is unset
    pub fn from_config(config: &PipelineConfig) -> Result<Option<Self>> {
        let Some(model) = config.analyzer.model.clone() else {
            return Ok(None);
        };
        let api_key = match std::env::var(&config.analyzer.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                tracing::warn!(
                    "{} is not set, AI analysis disabled",
                    config.analyzer.api_key_env
                );
                return Ok(None);
            }
        };
        if config.analyzer.endpoint.trim().is_empty() {
            return Err(anyhow!("analyzer.endpoint is empty"));
        }

        // The pipeline enforces its own deadline; this only stops abandoned
        // requests from lingering forever.
        let agent = ureq::AgentBuilder::new()
            .timeout(config.analyzer_timeout().saturating_mul(2))
            .build();

        Ok(Some(Self {
            agent,
            endpoint: config.analyzer.endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            config: Arc::new(config.clone()),
        }))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn prompt_for(&self, label: &str) -> &str {
        self.config.prompt_for(label)
    }
}

impl Analyzer for GeminiAnalyzer {
    fn analyze(&self, image: &RgbImage, label: &str) -> Result<String> {
        let _span = tracing::debug_span!("gemini_analyze", label).entered();

        let data = jpeg_base64(image, UPLOAD_JPEG_QUALITY).context("Failed to encode incident image")?;
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": self.prompt_for(label) },
                    { "inline_data": { "mime_type": "image/jpeg", "data": data } }
                ]
            }]
        });

        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let response: Value = self
            .agent
            .post(&url)
            .query("key", &self.api_key)
            .send_json(body)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => anyhow!("analysis service returned HTTP {code}"),
                other => anyhow!("analysis request failed: {other}"),
            })?
            .into_json()
            .context("Failed to parse analysis response")?;

        extract_text(&response).ok_or_else(|| anyhow!("analysis response carried no text"))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

fn extract_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    let text = text.join("").trim().to_string();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
