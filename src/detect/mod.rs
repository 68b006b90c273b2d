mod annotate;
mod backend;
mod backends;
mod result;
pub mod summary;

pub use annotate::annotate_detections;
pub use backend::DetectorBackend;
pub use backends::{select_backend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{class_counts, Detection, DetectionOutcome};
