use super::{Event, Publisher};
use crate::error::PublishError;
use parking_lot::Mutex;
use std::io::Write;

/// Writes one JSON object per event per line
pub struct JsonLinesPublisher<W: Write + Send> {
    out: Mutex<W>,
    include_images: bool,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(out: W, include_images: bool) -> Self {
        Self {
            out: Mutex::new(out),
            include_images,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> Publisher for JsonLinesPublisher<W> {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        let event = if self.include_images {
            event
        } else {
            event.without_images()
        };
        let line = serde_json::to_vec(&event)?;

        let mut out = self.out.lock();
        out.write_all(&line)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::FrameUpdate;

    #[test]
    fn writes_one_line_per_event() {
        let publisher = JsonLinesPublisher::new(Vec::new(), false);
        publisher
            .publish(Event::MonitoringStarted { source: "camera:0".into() })
            .unwrap();
        publisher
            .publish(Event::VideoFrame(FrameUpdate {
                frame: "large".into(),
                frame_count: 3,
                detections: vec![],
                fps: "1.0".into(),
                inference_time: "1.0ms".into(),
            }))
            .unwrap();

        let text = String::from_utf8(publisher.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let frame: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(frame["event"], "video_frame");
        assert_eq!(frame["data"]["frame"], "");
        assert_eq!(frame["data"]["frame_count"], 3);
    }
}
