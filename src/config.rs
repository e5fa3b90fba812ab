use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Settings for the external AI-analysis service.
///
/// The key itself never lives in the config file, only the name of the
/// environment variable holding it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Model identifier. Analysis is disabled when unset.
    pub model: Option<String>,
    pub api_key_env: String,
    pub endpoint: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: Option<PathBuf>,
    /// Class labels by model output index. Overrides labels embedded in the model.
    pub classes: Vec<String>,
}

/// Everything the pipeline reads at session start.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-class confidence thresholds, keyed by lower-case label
    pub thresholds: HashMap<String, f32>,
    pub default_threshold: f32,
    /// Classes that are never drawn, reported or alerted
    pub ignored_classes: Vec<String>,

    /// Only every Nth frame is analyzed
    pub frame_skip: u64,
    pub cooldown_secs: f64,
    pub frame_buffer_capacity: usize,

    pub detector_input: Resolution,
    pub display_size: Resolution,

    pub stream_interval_ms: u64,
    pub stream_jpeg_quality: u8,
    pub alert_jpeg_quality: u8,
    pub evidence_jpeg_quality: u8,

    pub crop_padding: u32,
    pub max_crop_size: u32,
    pub analyzer_timeout_secs: f64,

    pub poll_interval_ms: u64,
    pub frame_yield_ms: u64,
    pub publish_backoff_ms: u64,

    pub alerts_dir: PathBuf,
    pub font_path: Option<PathBuf>,

    /// Fixed analysis text used when the analyzer fails, by class
    pub fallbacks: HashMap<String, String>,
    pub generic_fallback: String,
    pub prompts: HashMap<String, String>,
    pub generic_prompt: String,

    pub analyzer: AnalyzerConfig,
    pub detector: DetectorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let fallbacks = [
            (
                "severe",
                "Severe incident detected - immediate emergency response required",
            ),
            (
                "moderate",
                "Moderate incident detected - emergency assistance needed",
            ),
            ("fall", "Person has fallen - medical assistance required"),
        ];
        let prompts = [
            (
                "severe",
                "Analyze this severe emergency incident. Provide a brief 2-sentence report for first responders focusing on immediate hazards and required response level.",
            ),
            (
                "moderate",
                "Analyze this moderate emergency incident. Provide a brief 2-sentence report for first responders focusing on the situation and recommended response.",
            ),
            (
                "fall",
                "Analyze this fall incident. Provide a brief 2-sentence report for first responders focusing on the person's condition and immediate medical needs.",
            ),
        ];

        Self {
            thresholds: HashMap::new(),
            default_threshold: 0.5,
            ignored_classes: vec!["slight".to_string()],
            frame_skip: 3,
            cooldown_secs: 5.0,
            frame_buffer_capacity: 3,
            detector_input: Resolution::new(640, 640),
            display_size: Resolution::new(640, 480),
            stream_interval_ms: 33,
            stream_jpeg_quality: 75,
            alert_jpeg_quality: 85,
            evidence_jpeg_quality: 95,
            crop_padding: 30,
            max_crop_size: 400,
            analyzer_timeout_secs: 20.0,
            poll_interval_ms: 100,
            frame_yield_ms: 10,
            publish_backoff_ms: 100,
            alerts_dir: PathBuf::from("alerts"),
            font_path: None,
            fallbacks: owned_map(&fallbacks),
            generic_fallback: "Emergency incident detected - response required".to_string(),
            prompts: owned_map(&prompts),
            generic_prompt: "Analyze this emergency incident. Provide a brief 2-sentence report for first responders.".to_string(),
            analyzer: AnalyzerConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

fn owned_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl PipelineConfig {
    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Lower-case every class key so lookups match detector labels.
    pub fn normalize(&mut self) {
        self.thresholds = self
            .thresholds
            .drain()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        self.fallbacks = self
            .fallbacks
            .drain()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        self.prompts = self
            .prompts
            .drain()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        for class in &mut self.ignored_classes {
            *class = class.to_lowercase();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.frame_skip == 0 {
            return invalid("frame_skip must be at least 1".into());
        }
        if self.frame_buffer_capacity == 0 {
            return invalid("frame_buffer_capacity must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.default_threshold) {
            return invalid(format!(
                "default_threshold {} outside [0, 1]",
                self.default_threshold
            ));
        }
        for (class, threshold) in &self.thresholds {
            if !(0.0..=1.0).contains(threshold) {
                return invalid(format!("threshold for {class} ({threshold}) outside [0, 1]"));
            }
        }
        for (name, quality) in [
            ("stream_jpeg_quality", self.stream_jpeg_quality),
            ("alert_jpeg_quality", self.alert_jpeg_quality),
            ("evidence_jpeg_quality", self.evidence_jpeg_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return invalid(format!("{name} must be between 1 and 100"));
            }
        }
        for (name, res) in [
            ("detector_input", self.detector_input),
            ("display_size", self.display_size),
        ] {
            if res.width == 0 || res.height == 0 {
                return invalid(format!("{name} must be non-zero"));
            }
        }
        if self.max_crop_size == 0 {
            return invalid("max_crop_size must be non-zero".into());
        }
        if Duration::try_from_secs_f64(self.cooldown_secs).is_err() {
            return invalid(format!(
                "cooldown_secs {} is not a valid duration",
                self.cooldown_secs
            ));
        }
        if !(self.analyzer_timeout_secs > 0.0)
            || Duration::try_from_secs_f64(self.analyzer_timeout_secs).is_err()
        {
            return invalid(format!(
                "analyzer_timeout_secs {} must be a positive duration",
                self.analyzer_timeout_secs
            ));
        }
        Ok(())
    }

    /// Saturates instead of panicking on values `validate` would reject
    pub fn cooldown(&self) -> Duration {
        seconds(self.cooldown_secs)
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }

    pub fn analyzer_timeout(&self) -> Duration {
        seconds(self.analyzer_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn frame_yield(&self) -> Duration {
        Duration::from_millis(self.frame_yield_ms)
    }

    pub fn publish_backoff(&self) -> Duration {
        Duration::from_millis(self.publish_backoff_ms)
    }

    pub fn fallback_for(&self, label: &str) -> &str {
        self.fallbacks
            .get(&label.to_lowercase())
            .map(String::as_str)
            .unwrap_or(&self.generic_fallback)
    }

    pub fn prompt_for(&self, label: &str) -> &str {
        self.prompts
            .get(&label.to_lowercase())
            .map(String::as_str)
            .unwrap_or(&self.generic_prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.frame_skip, 3);
        assert_eq!(config.frame_buffer_capacity, 3);
        assert_eq!(config.cooldown(), Duration::from_secs(5));
        assert!(config.thresholds.is_empty());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut config: PipelineConfig = serde_json::from_str(
            r#"{ "thresholds": { "Fall": 0.76 }, "frame_skip": 2 }"#,
        )
        .unwrap();
        config.normalize();
        assert_eq!(config.thresholds.get("fall"), Some(&0.76));
        assert_eq!(config.frame_skip, 2);
        assert_eq!(config.crop_padding, 30);
        assert_eq!(config.ignored_classes, vec!["slight".to_string()]);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = PipelineConfig::default();
        config.thresholds.insert("severe".into(), 1.5);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_frame_skip() {
        let config = PipelineConfig {
            frame_skip: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_durations_out_of_range() {
        for cooldown in [1e20, -1.0, f64::NAN, f64::INFINITY] {
            let config = PipelineConfig {
                cooldown_secs: cooldown,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "cooldown {cooldown} accepted");
        }
        for timeout in [0.0, 1e20, f64::NAN] {
            let config = PipelineConfig {
                analyzer_timeout_secs: timeout,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "timeout {timeout} accepted");
        }
    }

    #[test]
    fn unvalidated_durations_saturate() {
        let config = PipelineConfig {
            cooldown_secs: 1e20,
            analyzer_timeout_secs: f64::NAN,
            ..PipelineConfig::default()
        };
        assert_eq!(config.cooldown(), Duration::MAX);
        assert_eq!(config.analyzer_timeout(), Duration::ZERO);
    }

    #[test]
    fn fallback_lookup_is_case_insensitive() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.fallback_for("FALL"),
            "Person has fallen - medical assistance required"
        );
        assert_eq!(config.fallback_for("fire"), config.generic_fallback);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = PipelineConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
