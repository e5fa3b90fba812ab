//! Real-time emergency detection pipeline.
//!
//! Frames flow one way: a [`capture::FrameSource`] feeds the ingestion stage,
//! which runs a [`detection::Detector`], draws overlays and fans out into a
//! frame buffer (drained by the streaming stage) and an alert buffer (drained
//! by the enrichment stage). [`pipeline::Monitor`] owns the session lifecycle.

pub mod analysis;
pub mod capture;
pub mod codec;
pub mod config;
pub mod detection;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod publish;
pub mod storage;

pub use config::PipelineConfig;
pub use error::{SessionError, SessionState};
pub use pipeline::Monitor;
