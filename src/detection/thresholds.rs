use crate::config::PipelineConfig;
use std::collections::{HashMap, HashSet};

/// Per-class confidence gate applied to raw detector output
#[derive(Debug, Clone)]
pub struct Thresholds {
    per_class: HashMap<String, f32>,
    default: f32,
    ignored: HashSet<String>,
}

impl Thresholds {
    pub fn new(per_class: HashMap<String, f32>, default: f32, ignored: HashSet<String>) -> Self {
        Self {
            per_class: per_class
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            default,
            ignored: ignored.into_iter().map(|c| c.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.thresholds.clone(),
            config.default_threshold,
            config.ignored_classes.iter().cloned().collect(),
        )
    }

    pub fn threshold_for(&self, label: &str) -> f32 {
        self.per_class
            .get(&label.to_lowercase())
            .copied()
            .unwrap_or(self.default)
    }

    pub fn is_ignored(&self, label: &str) -> bool {
        self.ignored.contains(&label.to_lowercase())
    }

    /// The threshold the detection passed, or `None` when it is ignored or
    /// scores below its class threshold. A score equal to the threshold passes.
    pub fn accept(&self, label: &str, confidence: f32) -> Option<f32> {
        if self.is_ignored(label) {
            return None;
        }
        let threshold = self.threshold_for(label);
        if confidence < threshold {
            tracing::debug!(
                "Rejected {}: conf={:.3} < thresh={:.3}",
                label,
                confidence,
                threshold
            );
            return None;
        }
        tracing::debug!(
            "Accepted {}: conf={:.3} >= thresh={:.3}",
            label,
            confidence,
            threshold
        );
        Some(threshold)
    }
}
