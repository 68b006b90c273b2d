//! plagascan
//!
//! Detection service for tomato pest monitoring: a user uploads a plant
//! image, a pretrained object-detection model flags pest instances, each
//! instance is persisted, and the results feed a percentage breakdown, a
//! historical bar chart, a downloadable PDF report and an email contact
//! channel.
//!
//! # Module Structure
//!
//! - `detect`: detection adapter (backend trait, ONNX + stub backends,
//!   box annotation, textual summary format)
//! - `stats`: percentage calculator
//! - `storage`: sighting store (SQLite + in-memory)
//! - `uploads`: content-hash-namespaced upload persistence
//! - `report` / `chart`: PDF report and aggregate bar chart artifacts
//! - `mailer`: contact notifier (SMTP + recording/disabled transports)
//! - `pipeline`: the upload-to-report orchestration
//! - `web`: HTTP surface and single-page UI

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chart;
pub mod config;
pub mod detect;
pub mod mailer;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod storage;
pub mod uploads;
pub mod web;

pub use config::AppConfig;
pub use detect::{
    annotate_detections, select_backend, Detection, DetectionOutcome, DetectorBackend, StubBackend,
};
pub use mailer::{ContactMessage, DisabledMailer, Mailer, MemoryMailer, SmtpMailer};
pub use pipeline::{DetectionPipeline, RunOutcome};
pub use stats::percentages;
pub use storage::{ClassCount, InMemorySightingStore, SightingStore, SqliteSightingStore};

/// Seconds since the Unix epoch.
pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
