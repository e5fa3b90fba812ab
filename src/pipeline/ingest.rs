use super::alert_buffer::AlertBuffer;
use super::cancel::CancelToken;
use super::cooldown::CooldownGate;
use super::frame_buffer::FrameBuffer;
use super::record::{AlertCandidate, FrameRecord};
use crate::capture::FrameSource;
use crate::config::PipelineConfig;
use crate::detection::{Detector, Scale, Thresholds};
use crate::error::{DetectorError, SourceError, StageError};
use crate::overlay::Overlay;
use crate::publish::{DetectionSummary, Event, Publisher};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;

/// How the ingestion stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The source ran out of frames
    Exhausted,
    Stopped,
    Failed,
}

impl Outcome {
    pub fn status(self) -> &'static str {
        match self {
            Outcome::Exhausted => "completed",
            Outcome::Stopped => "stopped",
            Outcome::Failed => "failed",
        }
    }
}

/// Reads frames, runs the detector on every Nth one and fans out into the
/// frame and alert buffers.
pub(crate) struct Ingestion {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn Detector>,
    pub config: Arc<PipelineConfig>,
    pub thresholds: Thresholds,
    pub gate: CooldownGate,
    pub overlay: Overlay,
    pub frames: Arc<FrameBuffer<FrameRecord>>,
    pub alerts: Arc<AlertBuffer<AlertCandidate>>,
    pub cancel: CancelToken,
    pub publisher: Arc<dyn Publisher>,
    frame_count: u64,
    total_detections: u64,
}

impl Ingestion {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        config: Arc<PipelineConfig>,
        overlay: Overlay,
        frames: Arc<FrameBuffer<FrameRecord>>,
        alerts: Arc<AlertBuffer<AlertCandidate>>,
        cancel: CancelToken,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            source,
            detector,
            thresholds: Thresholds::from_config(&config),
            gate: CooldownGate::new(config.cooldown()),
            config,
            overlay,
            frames,
            alerts,
            cancel,
            publisher,
            frame_count: 0,
            total_detections: 0,
        }
    }

    /// Runs until the source ends, the session is cancelled or a fatal
    /// error occurs. Both buffers are closed on the way out; a fatal error
    /// is published once and cancels the other stages.
    pub fn run(mut self) -> Outcome {
        tracing::info!("Ingestion stage started");

        let result = self.run_loop();
        self.frames.close();
        self.alerts.close();

        match result {
            Ok(()) if self.cancel.is_cancelled() => {
                tracing::info!("Ingestion stopped after {} frames", self.frame_count);
                Outcome::Stopped
            }
            Ok(()) => {
                tracing::info!(
                    "Source exhausted after {} frames, draining buffers",
                    self.frame_count
                );
                Outcome::Exhausted
            }
            Err(e) => {
                tracing::error!("Ingestion failed: {}", e);
                if let Err(pe) = self.publisher.publish(Event::MonitoringError {
                    error: e.to_string(),
                }) {
                    tracing::warn!("Failed to publish monitoring error: {}", pe);
                }
                self.cancel.cancel();
                Outcome::Failed
            }
        }
    }

    fn run_loop(&mut self) -> Result<(), StageError> {
        let skip = self.config.frame_skip.max(1);
        let frame_yield = self.config.frame_yield();

        while !self.cancel.is_cancelled() {
            let frame = match self.source.read_frame().map_err(SourceError::Read)? {
                Some(frame) => frame,
                None => return Ok(()),
            };
            self.frame_count += 1;

            if self.frame_count % skip != 0 {
                continue;
            }

            self.process(frame)?;

            if self.cancel.wait_timeout(frame_yield) {
                break;
            }
        }
        Ok(())
    }

    fn process(&mut self, frame: RgbImage) -> Result<(), DetectorError> {
        let sequence = self.frame_count;
        let _span = tracing::debug_span!("detect", frame = sequence).entered();

        let (src_w, src_h) = frame.dimensions();
        let input = self.config.detector_input;
        let display = self.config.display_size;

        let model_input = imageops::resize(&frame, input.width, input.height, FilterType::Triangle);
        let mut canvas = imageops::resize(&frame, display.width, display.height, FilterType::Triangle);

        let started = Instant::now();
        let detections = self
            .detector
            .detect(&model_input)
            .map_err(|reason| DetectorError {
                frame: sequence,
                reason,
            })?;
        let latency = started.elapsed();

        let to_source = Scale::between((input.width, input.height), (src_w, src_h));
        let to_display = Scale::between((src_w, src_h), (display.width, display.height));
        let source = Arc::new(frame);

        let mut kept = Vec::with_capacity(detections.len());
        for detection in detections {
            let label = detection.label.to_lowercase();
            let Some(threshold) = self.thresholds.accept(&label, detection.confidence) else {
                continue;
            };

            let bbox = to_source.map_box(&detection.bbox);
            self.overlay.draw_detection(
                &mut canvas,
                to_display.map_pixel_box(&bbox),
                &label,
                detection.confidence,
            );
            self.total_detections += 1;

            if self.gate.admit(&label, Instant::now()) {
                tracing::info!(
                    "Alert queued: {} ({:.2}) on frame {}",
                    label,
                    detection.confidence,
                    sequence
                );
                self.alerts.push(AlertCandidate {
                    frame: Arc::clone(&source),
                    bbox,
                    label: label.clone(),
                    confidence: detection.confidence,
                    threshold,
                });
            }

            kept.push(DetectionSummary {
                class_name: label,
                confidence: detection.confidence,
                bbox,
            });
        }

        let secs = latency.as_secs_f32();
        let fps = if secs > 0.0 { 1.0 / secs } else { 0.0 };
        self.overlay
            .draw_stats(&mut canvas, fps, sequence, self.total_detections);

        tracing::debug!(
            "Frame {}: {} detections kept, inference {:.1}ms",
            sequence,
            kept.len(),
            secs * 1000.0
        );

        let evicted = self.frames.push(FrameRecord {
            image: canvas,
            sequence,
            detections: kept,
            latency,
            fps,
        });
        if let Some(old) = evicted {
            tracing::debug!("Frame buffer full, dropped frame {}", old.sequence);
        }
        Ok(())
    }
}
