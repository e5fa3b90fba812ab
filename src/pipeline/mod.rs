//! The three concurrently running stages and the session controller that
//! owns them.
//!
//! Ingestion feeds a bounded [`FrameBuffer`] drained by streaming and an
//! unbounded [`AlertBuffer`] drained by enrichment. A shared
//! [`CancelToken`] stops all three.

mod alert_buffer;
mod cancel;
mod cooldown;
mod enrich;
mod frame_buffer;
mod ingest;
mod monitor;
mod record;
mod stream;

pub use alert_buffer::{AlertBuffer, Pop};
pub use cancel::CancelToken;
pub use cooldown::CooldownGate;
pub use frame_buffer::{FrameBuffer, Take};
pub use monitor::{Collaborators, Monitor};
pub use record::{AlertCandidate, AlertCounter, EmergencyReport, FrameRecord, ReportDocument};
