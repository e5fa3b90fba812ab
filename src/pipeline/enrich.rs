use super::alert_buffer::{AlertBuffer, Pop};
use super::cancel::CancelToken;
use super::record::{AlertCandidate, AlertCounter, EmergencyReport};
use crate::analysis::Analyzer;
use crate::codec;
use crate::config::PipelineConfig;
use crate::detection::PixelBox;
use crate::error::EnrichmentError;
use crate::publish::{AlertNotice, Event, Publisher};
use crate::storage::{EvidenceKeys, EvidenceStore};
use chrono::Local;
use crossbeam_channel::select;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;

const PROCESSING_STATUS: &str = "Getting AI analysis...";

/// Outcome of one bounded analyzer call
#[derive(Debug, PartialEq)]
pub(crate) enum Analysis {
    Text(String),
    /// Analyzer failed or ran out of time; carries the class fallback
    Fallback(String),
    Cancelled,
}

/// Turns alert candidates into persisted, published emergency reports.
pub(crate) struct Enrichment {
    pub alerts: Arc<AlertBuffer<AlertCandidate>>,
    pub config: Arc<PipelineConfig>,
    pub analyzer: Arc<dyn Analyzer>,
    pub store: Arc<dyn EvidenceStore>,
    pub publisher: Arc<dyn Publisher>,
    pub counter: Arc<AlertCounter>,
    pub cancel: CancelToken,
}

impl Enrichment {
    pub fn run(self) {
        tracing::info!("Enrichment stage started, analyzer: {}", self.analyzer.name());
        let poll = self.config.poll_interval();
        let mut published = 0u64;

        loop {
            let candidate = match self.alerts.pop(&self.cancel, poll) {
                Pop::Item(candidate) => candidate,
                Pop::Empty => continue,
                Pop::Closed => {
                    tracing::info!("Alert buffer drained");
                    break;
                }
                Pop::Cancelled => break,
            };

            let label = candidate.label.clone();
            match self.process(candidate) {
                Ok(Some(report)) => {
                    published += 1;
                    tracing::info!("{} published for {}", report.alert_id(), report.label);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Alert enrichment failed for {}: {}", label, e);
                    self.notify(Event::AlertError {
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!("Enrichment stage stopped after {} alerts", published);
    }

    /// `Ok(None)` when the session was cancelled mid-analysis
    pub fn process(&self, candidate: AlertCandidate) -> Result<Option<EmergencyReport>, EnrichmentError> {
        let _span = tracing::debug_span!("enrich", class = %candidate.label).entered();

        let crop = crop_incident(
            &candidate.frame,
            candidate.bbox,
            &candidate.label,
            self.config.crop_padding,
            self.config.max_crop_size,
        )?;

        self.notify(Event::AlertProcessing {
            kind: candidate.label.clone(),
            status: PROCESSING_STATUS.to_string(),
        });

        let started = Instant::now();
        let analysis = match self.analyze(crop.clone(), &candidate.label) {
            Analysis::Text(text) => text,
            Analysis::Fallback(text) => text,
            Analysis::Cancelled => {
                tracing::debug!("Analysis for {} abandoned, session stopping", candidate.label);
                return Ok(None);
            }
        };
        let ai_time = started.elapsed();
        tracing::debug!("AI analysis for {} took {:.1}s", candidate.label, ai_time.as_secs_f64());

        // Encode before taking an id so a failure here leaves no gap
        let evidence = codec::encode_jpeg(&crop, self.config.evidence_jpeg_quality)?;
        let image = codec::jpeg_base64(&crop, self.config.alert_jpeg_quality)?;

        let id = self.counter.next();
        let timestamp = Local::now();
        let keys = EvidenceKeys::new(id, &candidate.label, &timestamp);
        let report = EmergencyReport {
            id,
            label: candidate.label,
            confidence: candidate.confidence,
            threshold: candidate.threshold,
            timestamp,
            analysis,
            evidence: keys.image.clone(),
            ai_time,
        };

        self.persist(&keys, &evidence, &report)?;

        self.notify(Event::EmergencyAlert(AlertNotice {
            kind: report.label.clone(),
            confidence: report.confidence,
            analysis: report.analysis.clone(),
            alert_message: report.message(),
            timestamp: report.formatted_time(),
            image,
            alert_id: report.alert_id(),
            ai_time: format!("{:.1}s", ai_time.as_secs_f64()),
        }));

        Ok(Some(report))
    }

    /// Writes are fire-and-forget: store failures are logged, not retried
    fn persist(&self, keys: &EvidenceKeys, evidence: &[u8], report: &EmergencyReport) -> Result<(), EnrichmentError> {
        let document = serde_json::to_vec_pretty(&report.document())?;

        if let Err(e) = self.store.put(&keys.image, evidence) {
            tracing::warn!("Failed to save evidence {}: {:#}", keys.image, e);
        }
        if let Err(e) = self.store.put(&keys.report, &document) {
            tracing::warn!("Failed to save report {}: {:#}", keys.report, e);
        } else {
            tracing::info!("Emergency alert saved: {}", keys.report);
        }
        Ok(())
    }

    /// Run the analyzer on a helper thread, giving up after the configured
    /// timeout or when the session is cancelled. An abandoned call keeps
    /// running to completion in the background; its result is discarded.
    fn analyze(&self, crop: RgbImage, label: &str) -> Analysis {
        let fallback = || Analysis::Fallback(self.config.fallback_for(label).to_string());
        let (tx, rx) = crossbeam_channel::bounded(1);

        let analyzer = Arc::clone(&self.analyzer);
        let owned_label = label.to_string();
        let spawned = std::thread::Builder::new()
            .name("analyzer".into())
            .spawn(move || {
                let _ = tx.send(analyzer.analyze(&crop, &owned_label));
            });
        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn analyzer call: {}", e);
            return fallback();
        }

        let timeout = self.config.analyzer_timeout();
        select! {
            recv(rx) -> msg => match msg {
                Ok(Ok(text)) if !text.trim().is_empty() => Analysis::Text(text.trim().to_string()),
                Ok(Ok(_)) => {
                    tracing::warn!("Analyzer returned no text for {}, using fallback", label);
                    fallback()
                }
                Ok(Err(e)) => {
                    tracing::warn!("Analyzer failed for {}: {:#}, using fallback", label, e);
                    fallback()
                }
                Err(_) => {
                    tracing::warn!("Analyzer call for {} panicked, using fallback", label);
                    fallback()
                }
            },
            recv(self.cancel.done()) -> _ => Analysis::Cancelled,
            default(timeout) => {
                tracing::warn!(
                    "Analyzer timed out after {:.1}s for {}, using fallback",
                    timeout.as_secs_f64(),
                    label
                );
                fallback()
            }
        }
    }

    fn notify(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.publisher.publish(event) {
            tracing::warn!("Failed to publish {}: {}", name, e);
        }
    }
}

/// Cut the padded incident region out of the source frame, shrinking it to
/// fit within `max_size` on its longer side.
pub(crate) fn crop_incident(
    frame: &RgbImage,
    bbox: PixelBox,
    label: &str,
    padding: u32,
    max_size: u32,
) -> Result<RgbImage, EnrichmentError> {
    let (width, height) = frame.dimensions();
    let region = bbox.padded(padding, width, height);
    if region.width() == 0 || region.height() == 0 {
        return Err(EnrichmentError::EmptyCrop {
            label: label.to_string(),
            bbox: bbox.into(),
        });
    }

    let crop = imageops::crop_imm(frame, region.x1, region.y1, region.width(), region.height()).to_image();
    let longest = crop.width().max(crop.height());
    if longest <= max_size {
        return Ok(crop);
    }

    let scale = max_size as f64 / longest as f64;
    let w = ((crop.width() as f64 * scale).round() as u32).clamp(1, max_size);
    let h = ((crop.height() as f64 * scale).round() as u32).clamp(1, max_size);
    Ok(imageops::resize(&crop, w, h, FilterType::Triangle))
}
