use super::cancel::CancelToken;
use super::frame_buffer::{FrameBuffer, Take};
use super::record::FrameRecord;
use crate::codec;
use crate::publish::{Event, FrameUpdate, Publisher};
use std::sync::Arc;
use std::time::Duration;

/// Publishes buffered frames to viewers at a fixed cadence, independent of
/// the detection rate.
pub(crate) struct Streaming {
    pub frames: Arc<FrameBuffer<FrameRecord>>,
    pub publisher: Arc<dyn Publisher>,
    pub cancel: CancelToken,
    pub interval: Duration,
    pub backoff: Duration,
    pub jpeg_quality: u8,
}

impl Streaming {
    pub fn run(self) {
        tracing::info!("Streaming stage started, interval {:?}", self.interval);
        let mut published = 0u64;

        while !self.cancel.is_cancelled() {
            match self.frames.take() {
                Take::Item(record) => {
                    if self.publish(record) {
                        published += 1;
                    } else if self.cancel.wait_timeout(self.backoff) {
                        break;
                    }
                }
                Take::Empty => {}
                Take::Closed => {
                    tracing::info!("Frame buffer drained");
                    break;
                }
            }

            if self.cancel.wait_timeout(self.interval) {
                break;
            }
        }

        tracing::info!("Streaming stage stopped after {} frames", published);
    }

    /// False when the frame could not be delivered
    fn publish(&self, record: FrameRecord) -> bool {
        let frame = match codec::jpeg_base64(&record.image, self.jpeg_quality) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to encode frame {}: {}", record.sequence, e);
                return false;
            }
        };

        let event = Event::VideoFrame(FrameUpdate {
            frame,
            frame_count: record.sequence,
            detections: record.detections,
            fps: format!("{:.1}", record.fps),
            inference_time: format!("{:.1}ms", record.latency.as_secs_f64() * 1000.0),
        });

        match self.publisher.publish(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to publish frame {}: {}", record.sequence, e);
                false
            }
        }
    }
}
