use super::BBox;
use serde::Serialize;

/// Integer box in some frame's pixel space, corners inclusive of the
/// top-left and exclusive of the bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "[u32; 4]")]
pub struct PixelBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn to_bbox(self) -> BBox {
        BBox::new(self.x1 as f32, self.y1 as f32, self.x2 as f32, self.y2 as f32)
    }

    /// Grow by `pad` on every side, clamped to a `width`x`height` frame
    pub fn padded(&self, pad: u32, width: u32, height: u32) -> PixelBox {
        PixelBox {
            x1: self.x1.saturating_sub(pad),
            y1: self.y1.saturating_sub(pad),
            x2: self.x2.saturating_add(pad).min(width),
            y2: self.y2.saturating_add(pad).min(height),
        }
    }
}

impl From<PixelBox> for [u32; 4] {
    fn from(b: PixelBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Linear mapping between two resolutions of the same frame.
///
/// Mapped coordinates are rounded to the nearest pixel (ties away from
/// zero) and clamped to the target frame, so a box mapped one way and back
/// through [`Scale::inverse`] lands within one pixel of where it started
/// whenever the intermediate frame is at least as large as the starting one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub x: f32,
    pub y: f32,
    target: (u32, u32),
    source: (u32, u32),
}

impl Scale {
    /// Mapping from a `from` sized frame into a `to` sized frame
    pub fn between(from: (u32, u32), to: (u32, u32)) -> Self {
        Self {
            x: to.0 as f32 / from.0.max(1) as f32,
            y: to.1 as f32 / from.1.max(1) as f32,
            target: to,
            source: from,
        }
    }

    pub fn inverse(&self) -> Scale {
        Scale::between(self.target, self.source)
    }

    pub fn map_x(&self, x: f32) -> u32 {
        (x * self.x).round().clamp(0.0, self.target.0 as f32) as u32
    }

    pub fn map_y(&self, y: f32) -> u32 {
        (y * self.y).round().clamp(0.0, self.target.1 as f32) as u32
    }

    pub fn map_box(&self, bbox: &BBox) -> PixelBox {
        PixelBox {
            x1: self.map_x(bbox.x1),
            y1: self.map_y(bbox.y1),
            x2: self.map_x(bbox.x2),
            y2: self.map_y(bbox.y2),
        }
    }

    pub fn map_pixel_box(&self, bbox: &PixelBox) -> PixelBox {
        self.map_box(&bbox.to_bbox())
    }
}
