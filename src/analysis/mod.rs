mod gemini;

pub use gemini::GeminiAnalyzer;

use crate::config::PipelineConfig;
use anyhow::{bail, Result};
use image::RgbImage;
use std::sync::Arc;

/// Black-box incident analyst: given an incident crop and its class,
/// returns free text for first responders.
///
/// Implementations may block and may fail; the pipeline bounds every call
/// with a timeout and substitutes a fixed fallback on any failure.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, image: &RgbImage, label: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Used when no analysis service is configured; every call fails so the
/// pipeline falls back to the class message.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAnalyzer;

impl Analyzer for OfflineAnalyzer {
    fn analyze(&self, _image: &RgbImage, label: &str) -> Result<String> {
        bail!("analysis disabled, no service configured for {label}")
    }

    fn name(&self) -> &str {
        "offline"
    }
}

/// Pick the analyzer the configuration asks for
pub fn from_config(config: &PipelineConfig) -> Arc<dyn Analyzer> {
    match GeminiAnalyzer::from_config(config) {
        Ok(Some(analyzer)) => {
            tracing::info!("AI analysis enabled with model {}", analyzer.model());
            Arc::new(analyzer)
        }
        Ok(None) => {
            tracing::warn!("AI analysis not configured, alerts will carry fallback text");
            Arc::new(OfflineAnalyzer)
        }
        Err(e) => {
            tracing::warn!("Failed to initialize AI analysis: {:#}", e);
            Arc::new(OfflineAnalyzer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_analyzer_always_fails() {
        let image = RgbImage::new(4, 4);
        assert!(OfflineAnalyzer.analyze(&image, "fall").is_err());
    }

    #[test]
    fn unconfigured_model_selects_offline() {
        let config = PipelineConfig::default();
        assert_eq!(from_config(&config).name(), "offline");
    }
}
