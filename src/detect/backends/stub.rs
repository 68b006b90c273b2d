use anyhow::{anyhow, Result};
use std::time::Instant;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionOutcome};

/// Tile edge in pixels; one candidate detection per bright tile.
const TILE_SIZE: u32 = 160;
/// Mean channel value a tile must exceed to count as a detection.
const BRIGHTNESS_THRESHOLD: f64 = 200.0;

/// Stub backend for tests and model-less deployments.
///
/// The frame is split into fixed tiles; every tile whose mean brightness
/// exceeds a threshold yields one detection, with the class id rotating
/// over the configured class list. Deterministic: a black frame yields
/// zero detections, a white frame lights every tile.
pub struct StubBackend {
    num_classes: usize,
}

impl StubBackend {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes: num_classes.max(1),
        }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionOutcome> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }

        let started = Instant::now();
        let tiles_x = width.div_ceil(TILE_SIZE);
        let tiles_y = height.div_ceil(TILE_SIZE);
        let mut detections = Vec::new();

        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let x0 = tx * TILE_SIZE;
                let y0 = ty * TILE_SIZE;
                let x1 = (x0 + TILE_SIZE).min(width);
                let y1 = (y0 + TILE_SIZE).min(height);

                let mut sum = 0u64;
                let mut samples = 0u64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        let idx = ((y * width + x) * 3) as usize;
                        sum += pixels[idx] as u64 + pixels[idx + 1] as u64 + pixels[idx + 2] as u64;
                        samples += 3;
                    }
                }
                let mean = sum as f64 / samples as f64;
                if mean <= BRIGHTNESS_THRESHOLD {
                    continue;
                }

                let tile_index = (ty * tiles_x + tx) as usize;
                detections.push(Detection {
                    bbox: [
                        x0 as f32 / width as f32,
                        y0 as f32 / height as f32,
                        x1 as f32 / width as f32,
                        y1 as f32 / height as f32,
                    ],
                    confidence: (mean / 255.0) as f32,
                    class_id: tile_index % self.num_classes,
                });
            }
        }

        Ok(DetectionOutcome {
            detections,
            inference_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: u8, width: u32, height: u32) -> Vec<u8> {
        vec![value; (width * height * 3) as usize]
    }

    #[test]
    fn black_frame_yields_no_detections() {
        let mut backend = StubBackend::new(2);
        let outcome = backend.detect(&frame(0, 640, 640), 640, 640).unwrap();
        assert!(outcome.is_empty());
    }

    #[test]
    fn white_frame_lights_every_tile_with_rotating_classes() {
        let mut backend = StubBackend::new(2);
        let outcome = backend.detect(&frame(255, 640, 640), 640, 640).unwrap();
        // 640/160 = 4 tiles per side.
        assert_eq!(outcome.detections.len(), 16);
        let class_zero = outcome
            .detections
            .iter()
            .filter(|d| d.class_id == 0)
            .count();
        assert_eq!(class_zero, 8);
        for det in &outcome.detections {
            assert!(det.bbox[0] < det.bbox[2]);
            assert!(det.bbox[1] < det.bbox[3]);
            assert!(det.confidence > 0.9);
        }
    }

    #[test]
    fn rejects_wrong_buffer_size() {
        let mut backend = StubBackend::new(2);
        assert!(backend.detect(&[0u8; 12], 640, 640).is_err());
    }
}
