#![cfg(feature = "backend-tract")]

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionOutcome};

/// Upper bound on candidates entering suppression, to bound CPU time on
/// degenerate model outputs.
const MAX_NMS_INPUTS: usize = 300;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based backend for ONNX inference.
///
/// Loads a local model file and decodes the `[1, 4+nc, N]` output layout
/// (center-x, center-y, width, height followed by per-class scores, in
/// model-input pixel scale) into normalized detections. No network I/O.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    num_classes: usize,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        num_classes: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            num_classes,
            confidence_threshold: 0.2,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode_output(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        let shape = view.shape();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let rows = shape[1];
        let anchors = shape[2];
        if rows != 4 + self.num_classes {
            return Err(anyhow!(
                "model reports {} classes, configuration has {}",
                rows.saturating_sub(4),
                self.num_classes
            ));
        }

        let view = view.index_axis(tract_ndarray::Axis(0), 0);
        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..self.num_classes {
                let score = view[[4 + class, anchor]];
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            if best_score < self.confidence_threshold {
                continue;
            }

            let cx = view[[0, anchor]];
            let cy = view[[1, anchor]];
            let w = view[[2, anchor]];
            let h = view[[3, anchor]];
            let inv_w = 1.0 / self.width as f32;
            let inv_h = 1.0 / self.height as f32;
            candidates.push(Detection {
                bbox: [
                    ((cx - w / 2.0) * inv_w).clamp(0.0, 1.0),
                    ((cy - h / 2.0) * inv_h).clamp(0.0, 1.0),
                    ((cx + w / 2.0) * inv_w).clamp(0.0, 1.0),
                    ((cy + h / 2.0) * inv_h).clamp(0.0, 1.0),
                ],
                confidence: best_score,
                class_id: best_class,
            });
        }

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates.truncate(MAX_NMS_INPUTS);
        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionOutcome> {
        let input = self.build_input(pixels, width, height)?;
        let started = Instant::now();
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let inference_ms = started.elapsed().as_secs_f64() * 1000.0;
        let detections = self.decode_output(outputs)?;

        Ok(DetectionOutcome {
            detections,
            inference_ms,
        })
    }
}

/// Per-class greedy NMS over candidates already sorted by confidence.
fn non_max_suppression(candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let overlaps = kept.iter().any(|existing| {
            existing.class_id == candidate.class_id
                && iou(&existing.bbox, &candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], confidence: f32, class_id: usize) -> Detection {
        Detection {
            bbox,
            confidence,
            class_id,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [0.1, 0.1, 0.5, 0.5];
        assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou(&[0.0, 0.0, 0.2, 0.2], &[0.5, 0.5, 0.9, 0.9]), 0.0);
    }

    #[test]
    fn nms_keeps_highest_confidence_per_overlap_cluster() {
        let candidates = vec![
            det([0.1, 0.1, 0.5, 0.5], 0.9, 0),
            det([0.12, 0.12, 0.52, 0.52], 0.7, 0),
            det([0.6, 0.6, 0.9, 0.9], 0.6, 0),
        ];
        let kept = non_max_suppression(candidates, 0.45);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn nms_does_not_suppress_across_classes() {
        let candidates = vec![
            det([0.1, 0.1, 0.5, 0.5], 0.9, 0),
            det([0.1, 0.1, 0.5, 0.5], 0.8, 1),
        ];
        let kept = non_max_suppression(candidates, 0.45);
        assert_eq!(kept.len(), 2);
    }
}
