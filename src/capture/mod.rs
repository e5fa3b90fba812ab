#[cfg(feature = "camera")]
mod webcam;
mod sequence;

#[cfg(feature = "camera")]
pub use webcam::WebcamCapture;
pub use sequence::ImageSequence;

use crate::error::SourceError;
use anyhow::Result;
use image::RgbImage;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Trait for video frame sources
pub trait FrameSource {
    /// Read the next frame. `Ok(None)` marks the end of the stream.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Where a session reads its frames from.
///
/// Parsed from `camera:<index>` or a filesystem path to a directory of
/// still frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Camera(u32),
    Directory(PathBuf),
}

impl FromStr for SourceDescriptor {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SourceError::Descriptor(s.to_string()));
        }
        if let Some(index) = s.strip_prefix("camera:") {
            let index = index
                .parse::<u32>()
                .map_err(|_| SourceError::Descriptor(s.to_string()))?;
            return Ok(SourceDescriptor::Camera(index));
        }
        Ok(SourceDescriptor::Directory(PathBuf::from(s)))
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Camera(index) => write!(f, "camera:{index}"),
            SourceDescriptor::Directory(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Opens a [`FrameSource`] for a descriptor.
///
/// Called on the ingestion thread, so the source never crosses threads.
pub trait SourceFactory: Send + Sync {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>>;
}

impl<F> SourceFactory for F
where
    F: Fn(&SourceDescriptor) -> Result<Box<dyn FrameSource>> + Send + Sync,
{
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>> {
        self(descriptor)
    }
}

/// Opens camera and image-sequence sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSources;

impl SourceFactory for DefaultSources {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>> {
        match descriptor {
            #[cfg(feature = "camera")]
            SourceDescriptor::Camera(index) => Ok(Box::new(WebcamCapture::new(*index)?)),
            #[cfg(not(feature = "camera"))]
            SourceDescriptor::Camera(index) => {
                anyhow::bail!("camera:{index} requested but camera support is not compiled in")
            }
            SourceDescriptor::Directory(path) => Ok(Box::new(ImageSequence::open(path)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camera_descriptor() {
        let desc: SourceDescriptor = "camera:2".parse().unwrap();
        assert_eq!(desc, SourceDescriptor::Camera(2));
        assert_eq!(desc.to_string(), "camera:2");
    }

    #[test]
    fn parses_path_descriptor() {
        let desc: SourceDescriptor = "/data/frames".parse().unwrap();
        assert_eq!(desc, SourceDescriptor::Directory(PathBuf::from("/data/frames")));
    }

    #[test]
    fn rejects_bad_camera_index() {
        assert!(matches!(
            "camera:front".parse::<SourceDescriptor>(),
            Err(SourceError::Descriptor(_))
        ));
        assert!("".parse::<SourceDescriptor>().is_err());
    }

    #[test]
    fn default_sources_fail_on_missing_directory() {
        let desc = SourceDescriptor::Directory(PathBuf::from("/no/such/frames"));
        assert!(DefaultSources.open(&desc).is_err());
    }
}
