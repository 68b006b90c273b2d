use anyhow::Result;

use crate::detect::result::DetectionOutcome;

/// Detection adapter seam over the pretrained model.
///
/// Implementations receive a frame already resized to the model input
/// resolution and return structured detections; they must treat the pixel
/// slice as read-only and must not retain it beyond the call. A failure
/// to load or infer is fatal to the current request; there is no retry at
/// this boundary.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on an RGB frame (3 bytes per pixel, row-major).
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionOutcome>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
