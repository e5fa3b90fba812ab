mod channel;
mod jsonl;

pub use channel::ChannelPublisher;
pub use jsonl::JsonLinesPublisher;

use crate::detection::PixelBox;
use crate::error::PublishError;
use serde::Serialize;

/// One-way notification channel to live viewers.
///
/// Delivery is at-most-once with no acknowledgement; a failed publish is
/// logged by the caller and never retried.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: Event) -> Result<(), PublishError>;
}

/// A detection kept for a frame, in source-frame pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: PixelBox,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameUpdate {
    /// Base64 JPEG of the annotated display frame
    pub frame: String,
    pub frame_count: u64,
    pub detections: Vec<DetectionSummary>,
    pub fps: String,
    pub inference_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertNotice {
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f32,
    pub analysis: String,
    pub alert_message: String,
    pub timestamp: String,
    /// Base64 JPEG of the incident crop
    pub image: String,
    pub alert_id: String,
    pub ai_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    MonitoringStarted {
        source: String,
    },
    VideoFrame(FrameUpdate),
    AlertProcessing {
        #[serde(rename = "type")]
        kind: String,
        status: String,
    },
    EmergencyAlert(AlertNotice),
    AlertError {
        error: String,
    },
    MonitoringError {
        error: String,
    },
    MonitoringStopped {
        status: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::MonitoringStarted { .. } => "monitoring_started",
            Event::VideoFrame(_) => "video_frame",
            Event::AlertProcessing { .. } => "alert_processing",
            Event::EmergencyAlert(_) => "emergency_alert",
            Event::AlertError { .. } => "alert_error",
            Event::MonitoringError { .. } => "monitoring_error",
            Event::MonitoringStopped { .. } => "monitoring_stopped",
        }
    }

    /// Same event with image payloads emptied
    pub fn without_images(&self) -> Event {
        match self {
            Event::VideoFrame(update) => Event::VideoFrame(FrameUpdate {
                frame: String::new(),
                ..update.clone()
            }),
            Event::EmergencyAlert(notice) => Event::EmergencyAlert(AlertNotice {
                image: String::new(),
                ..notice.clone()
            }),
            other => other.clone(),
        }
    }
}
