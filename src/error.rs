use std::fmt;

/// Failure to open or read the video source.
///
/// Fatal to the session: all stages stop and subscribers are told once.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot open {descriptor}: {reason:#}")]
    Open {
        descriptor: String,
        reason: anyhow::Error,
    },

    #[error("unrecognised source descriptor: {0}")]
    Descriptor(String),

    #[error("frame read failed: {0:#}")]
    Read(anyhow::Error),
}

/// The detector call failed. Fatal to ingestion, tears the session down.
#[derive(Debug, thiserror::Error)]
#[error("detector failed on frame {frame}: {reason:#}")]
pub struct DetectorError {
    pub frame: u64,
    pub reason: anyhow::Error,
}

/// Failure while enriching one alert. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("empty incident region for {label} at {bbox:?}")]
    EmptyCrop { label: String, bbox: [u32; 4] },

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("report serialization failed: {0}")]
    Report(#[from] serde_json::Error),
}

/// A subscriber notification could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("subscriber channel closed")]
    Closed,

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("event write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the ingestion stage gave up. Either one ends the session.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Detector(#[from] DetectorError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a monitoring session is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to load detector: {0:#}")]
    Detector(anyhow::Error),

    #[error("{0} stage exited during startup")]
    Aborted(&'static str),

    #[error("failed to spawn {stage} stage: {source}")]
    Spawn {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// Lifecycle of the single active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Running => write!(f, "running"),
            SessionState::Stopping => write!(f, "stopping"),
        }
    }
}
