mod geometry;
#[cfg(feature = "onnx")]
mod preprocess;
mod thresholds;
#[cfg(feature = "onnx")]
mod yolo;

pub use geometry::{PixelBox, Scale};
#[cfg(feature = "onnx")]
pub use preprocess::Preprocessor;
pub use thresholds::Thresholds;
#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;

use anyhow::Result;
use image::RgbImage;

/// Axis-aligned box in floating point pixel coordinates (corner form)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = BBox::new(ix1, iy1, ix2, iy2).area();
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detector hit, in detector-input coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

/// Black-box object detector.
///
/// Given a frame already resized to the configured detector input
/// resolution, returns every hit in that resolution's coordinates.
pub trait Detector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;

    /// Class labels indexed by the model's class id
    fn labels(&self) -> &[String];

    fn label(&self, class_id: usize) -> Option<&str> {
        self.labels().get(class_id).map(String::as_str)
    }
}

/// Builds a fresh detector for each session.
///
/// Runs on the ingestion thread, so detectors need not be `Send`.
pub trait DetectorFactory: Send + Sync {
    fn load(&self) -> Result<Box<dyn Detector>>;
}

impl<F> DetectorFactory for F
where
    F: Fn() -> Result<Box<dyn Detector>> + Send + Sync,
{
    fn load(&self) -> Result<Box<dyn Detector>> {
        self()
    }
}

/// Greedy non-maximum suppression within each class
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections.drain(..) {
        let overlaps = kept
            .iter()
            .any(|k| k.label == det.label && k.bbox.iou(&det.bbox) > iou_threshold);
        if !overlaps {
            kept.push(det);
        }
    }
    *detections = kept;
}
