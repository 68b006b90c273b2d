mod stub;
#[cfg(feature = "backend-tract")]
mod tract;

pub use stub::StubBackend;
#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use anyhow::Result;

use crate::config::ModelSettings;
use crate::detect::backend::DetectorBackend;

/// Pick a detector backend for the configured model.
///
/// A configured model path selects ONNX inference when the crate was built
/// with `backend-tract`; everything else falls back to the deterministic
/// stub (and says so, since stub results are synthetic).
pub fn select_backend(settings: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    #[cfg(feature = "backend-tract")]
    if let Some(path) = &settings.path {
        let backend = TractBackend::new(
            path,
            settings.input_size,
            settings.input_size,
            settings.class_names.len(),
        )?
        .with_threshold(settings.confidence_threshold);
        return Ok(Box::new(backend));
    }

    if settings.path.is_some() {
        log::warn!("model path configured but built without backend-tract; using stub backend");
    }
    Ok(Box::new(StubBackend::new(settings.class_names.len())))
}
