use crate::detection::PixelBox;
use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

const LABEL_SCALE: f32 = 16.0;
const STATS_SCALE: f32 = 18.0;
const BOX_THICKNESS: u32 = 2;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Box colour for a class: red, orange, yellow, white for anything else
pub fn class_color(label: &str) -> Rgb<u8> {
    match label.to_lowercase().as_str() {
        "severe" => Rgb([255, 0, 0]),
        "moderate" => Rgb([255, 165, 0]),
        "fall" => Rgb([255, 255, 0]),
        _ => WHITE,
    }
}

/// Draws detection boxes and text onto display frames.
///
/// Text needs a font; without one only boxes and label backgrounds are drawn.
#[derive(Clone, Default)]
pub struct Overlay {
    font: Option<FontArc>,
}

impl Overlay {
    pub fn new(font_path: Option<&Path>) -> Result<Self> {
        let font = match font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read font {}", path.display()))?;
                let font = FontArc::try_from_vec(bytes)
                    .with_context(|| format!("Invalid font {}", path.display()))?;
                tracing::info!("Overlay font loaded from {}", path.display());
                Some(font)
            }
            None => None,
        };
        Ok(Self { font })
    }

    pub fn draw_detection(&self, canvas: &mut RgbImage, bbox: PixelBox, label: &str, confidence: f32) {
        let color = class_color(label);

        for inset in 0..BOX_THICKNESS {
            let w = bbox.width().saturating_sub(2 * inset);
            let h = bbox.height().saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at((bbox.x1 + inset) as i32, (bbox.y1 + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        let text = format!("{} {:.2}", label.to_uppercase(), confidence);
        let scale = PxScale::from(LABEL_SCALE);
        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, &text),
            None => (bbox.width().max(1), LABEL_SCALE as u32),
        };

        // Label bar sits above the box, or inside it at the top edge
        let bar_h = text_h + 10;
        let bar_top = bbox.y1 as i32 - bar_h as i32;
        let bar_top = if bar_top < 0 { bbox.y1 as i32 } else { bar_top };
        draw_filled_rect_mut(
            canvas,
            Rect::at(bbox.x1 as i32, bar_top).of_size(text_w.max(1), bar_h),
            color,
        );

        if let Some(font) = &self.font {
            draw_text_mut(canvas, WHITE, bbox.x1 as i32, bar_top + 5, scale, font, &text);
        }
    }

    pub fn draw_stats(&self, canvas: &mut RgbImage, inference_fps: f32, frame: u64, detections: u64) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(STATS_SCALE);
        draw_text_mut(
            canvas,
            GREEN,
            10,
            10,
            scale,
            font,
            &format!("Inference: {inference_fps:.1}FPS | Frame: {frame}"),
        );
        draw_text_mut(
            canvas,
            GREEN,
            10,
            35,
            scale,
            font,
            &format!("Detections: {detections}"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_colours() {
        assert_eq!(class_color("SEVERE"), Rgb([255, 0, 0]));
        assert_eq!(class_color("moderate"), Rgb([255, 165, 0]));
        assert_eq!(class_color("fall"), Rgb([255, 255, 0]));
        assert_eq!(class_color("smoke"), WHITE);
    }

    #[test]
    fn draws_box_outline_in_class_colour() {
        let mut canvas = RgbImage::new(100, 100);
        let bbox = PixelBox { x1: 20, y1: 40, x2: 60, y2: 80 };
        Overlay::default().draw_detection(&mut canvas, bbox, "fall", 0.9);

        assert_eq!(*canvas.get_pixel(20, 60), Rgb([255, 255, 0]));
        assert_eq!(*canvas.get_pixel(21, 60), Rgb([255, 255, 0]));
        assert_eq!(*canvas.get_pixel(40, 60), Rgb([0, 0, 0]));
    }

    #[test]
    fn degenerate_box_does_not_panic() {
        let mut canvas = RgbImage::new(10, 10);
        let bbox = PixelBox { x1: 9, y1: 0, x2: 9, y2: 10 };
        Overlay::default().draw_detection(&mut canvas, bbox, "severe", 0.5);
    }

    #[test]
    fn missing_font_is_an_error() {
        assert!(Overlay::new(Some(Path::new("/no/such/font.ttf"))).is_err());
    }
}
