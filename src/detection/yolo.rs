use super::preprocess::Preprocessor;
use super::{non_max_suppression, BBox, Detection, Detector};
use anyhow::{anyhow, bail, Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// Raw scores below this never reach the per-class thresholds
const CANDIDATE_FLOOR: f32 = 0.1;
const IOU_THRESHOLD: f32 = 0.45;

/// YOLOv8-style detector exported to ONNX
///
/// Expects a single output of shape `[1, 4 + classes, anchors]` holding
/// centre-form boxes followed by per-class scores.
pub struct YoloDetector {
    session: Session,
    preprocessor: Preprocessor,
    labels: Vec<String>,
}

impl YoloDetector {
    /// Load a model from an ONNX file
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `input_size` - (width, height) the model was exported for
    /// * `labels` - Class labels by index; when empty they are read from the
    ///   model's `names` metadata
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_size: (u32, u32),
        labels: Vec<String>,
    ) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading detector model from {}", path.display());

        let session = Session::builder()
            .map_err(|e| anyhow!("Failed to create session builder: {e}"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Failed to set optimization level: {e}"))?
            .with_intra_threads(4)
            .map_err(|e| anyhow!("Failed to set thread count: {e}"))?
            .commit_from_file(path)
            .map_err(|e| anyhow!("Failed to load model from {}: {e}", path.display()))?;

        let labels = if labels.is_empty() {
            let names = session
                .metadata()
                .ok()
                .and_then(|meta| meta.custom("names").ok().flatten());
            match names {
                Some(names) => parse_names(&names),
                None => bail!("Model has no class names; configure detector.classes"),
            }
        } else {
            labels
        };
        let labels: Vec<String> = labels.into_iter().map(|l| l.to_lowercase()).collect();

        tracing::info!("Detector loaded. Classes: {:?}", labels);

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(input_size.0, input_size.1),
            labels,
        })
    }

    fn decode(&self, shape: &[usize], data: &[f32]) -> Result<Vec<Detection>> {
        let [1, rows, anchors] = shape else {
            bail!("Unexpected detector output shape {:?}", shape);
        };
        let (rows, anchors) = (*rows, *anchors);
        if rows < 5 {
            bail!("Detector output has no class scores (shape {:?})", shape);
        }
        let classes = rows - 4;

        let at = |row: usize, anchor: usize| data[row * anchors + anchor];

        let mut detections = Vec::new();
        for anchor in 0..anchors {
            let (class_id, confidence) = (0..classes)
                .map(|c| (c, at(4 + c, anchor)))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if confidence < CANDIDATE_FLOOR {
                continue;
            }

            let cx = at(0, anchor);
            let cy = at(1, anchor);
            let w = at(2, anchor);
            let h = at(3, anchor);

            let label = self
                .label(class_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class_{class_id}"));

            detections.push(Detection {
                label,
                confidence,
                bbox: BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
            });
        }

        non_max_suppression(&mut detections, IOU_THRESHOLD);
        Ok(detections)
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let _span = tracing::debug_span!("yolo_detect").entered();

        let input = self.preprocessor.preprocess(image);
        let tensor = Tensor::from_array(input).map_err(|e| anyhow!("Failed to build input tensor: {e}"))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| anyhow!("Failed to run inference: {e}"))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to read detector output: {e}"))?;
        let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        let data = data.to_vec();
        drop(outputs);

        self.decode(&shape, &data).context("Failed to decode detections")
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Parse Ultralytics' `names` metadata, e.g. `{0: 'moderate', 1: 'severe'}`
fn parse_names(raw: &str) -> Vec<String> {
    let mut entries: Vec<(usize, String)> = raw
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .filter_map(|entry| {
            let (index, name) = entry.split_once(':')?;
            let index = index.trim().parse::<usize>().ok()?;
            let name = name.trim().trim_matches(|c| c == '\'' || c == '"');
            Some((index, name.to_string()))
        })
        .collect();
    entries.sort_by_key(|(index, _)| *index);
    entries.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ultralytics_names() {
        assert_eq!(
            parse_names("{1: 'severe', 0: 'moderate', 2: \"fall\"}"),
            vec!["moderate", "severe", "fall"]
        );
    }
}
