use crate::detection::PixelBox;
use crate::publish::DetectionSummary;
use chrono::{DateTime, Local};
use image::RgbImage;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One processed, annotated display frame
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub image: RgbImage,
    pub sequence: u64,
    pub detections: Vec<DetectionSummary>,
    pub latency: Duration,
    pub fps: f32,
}

/// A detection that passed its threshold and the cooldown gate
#[derive(Debug, Clone)]
pub struct AlertCandidate {
    /// Unannotated source frame, shared by every candidate from that frame
    pub frame: Arc<RgbImage>,
    /// In source-frame pixels
    pub bbox: PixelBox,
    pub label: String,
    pub confidence: f32,
    pub threshold: f32,
}

/// Process-wide alert id sequence: 1, 2, 3, ...
#[derive(Debug, Default)]
pub struct AlertCounter(AtomicU64);

impl AlertCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last id handed out, 0 if none
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// The enriched, persisted record of one admitted alert
#[derive(Debug, Clone)]
pub struct EmergencyReport {
    pub id: u64,
    pub label: String,
    pub confidence: f32,
    pub threshold: f32,
    pub timestamp: DateTime<Local>,
    pub analysis: String,
    /// Storage key of the evidence image
    pub evidence: String,
    pub ai_time: Duration,
}

/// On-disk JSON shape of a report
#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub alert_id: String,
    pub timestamp: String,
    pub incident_type: String,
    pub detection_confidence: f64,
    pub ai_analysis: &'a str,
    pub evidence_file: &'a str,
    pub detection_threshold: f32,
}

impl EmergencyReport {
    pub fn alert_id(&self) -> String {
        format!("EMRG-{:04}", self.id)
    }

    pub fn formatted_time(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Human-readable alert text sent to viewers
    pub fn message(&self) -> String {
        format!(
            "EMERGENCY ALERT #{}\n\
             TYPE: {} | CONFIDENCE: {:.1}%\n\
             TIME: {}\n\
             ANALYSIS: {}\n\
             ALERT ID: {}\n\
             AI PROCESSING TIME: {:.1}s",
            self.id,
            self.label.to_uppercase(),
            self.confidence * 100.0,
            self.formatted_time(),
            self.analysis,
            self.alert_id(),
            self.ai_time.as_secs_f64(),
        )
    }

    pub fn document(&self) -> ReportDocument<'_> {
        ReportDocument {
            alert_id: self.alert_id(),
            timestamp: self.formatted_time(),
            incident_type: self.label.to_uppercase(),
            detection_confidence: (f64::from(self.confidence) * 1000.0).round() / 1000.0,
            ai_analysis: &self.analysis,
            evidence_file: &self.evidence,
            detection_threshold: self.threshold,
        }
    }
}
