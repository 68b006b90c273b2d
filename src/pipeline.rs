//! Upload-to-report orchestration.
//!
//! One user action runs the whole chain synchronously: persist the
//! upload, decode, resize to the model input, detect, annotate and count.
//! Only when something was detected does the run record instances,
//! compute percentages and render the PDF report.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::config::ModelSettings;
use crate::detect::{annotate_detections, class_counts, summary, DetectorBackend};
use crate::report;
use crate::stats;
use crate::storage::{ClassCount, SightingStore};
use crate::uploads;

/// Result of one detection run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub counts: BTreeMap<String, u32>,
    /// Present only when at least one detection occurred.
    pub percentages: Option<BTreeMap<String, String>>,
    pub annotated_png: Vec<u8>,
    /// Present only when at least one detection occurred.
    pub report_pdf: Option<Vec<u8>>,
    pub recorded: u32,
    pub record_failures: u32,
    pub stored_path: PathBuf,
}

impl RunOutcome {
    pub fn total_detections(&self) -> u64 {
        self.counts.values().map(|&c| c as u64).sum()
    }
}

pub struct DetectionPipeline {
    backend: Box<dyn DetectorBackend>,
    store: Box<dyn SightingStore>,
    settings: ModelSettings,
    upload_dir: PathBuf,
}

impl DetectionPipeline {
    pub fn new(
        backend: Box<dyn DetectorBackend>,
        store: Box<dyn SightingStore>,
        settings: ModelSettings,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            store,
            settings,
            upload_dir: upload_dir.into(),
        }
    }

    /// Run the full chain for one uploaded image.
    ///
    /// Zero detections skip persistence, percentages and the report; a
    /// failing insert is logged and counted without aborting the run.
    /// Decode and inference failures abort the interaction.
    pub fn process(&mut self, image_bytes: &[u8], original_name: &str) -> Result<RunOutcome> {
        let stored_path = uploads::save_upload(&self.upload_dir, image_bytes, original_name)?;
        let decoded =
            image::load_from_memory(image_bytes).context("failed to decode uploaded image")?;

        let edge = self.settings.input_size;
        let mut frame = decoded
            .resize_exact(edge, edge, FilterType::Triangle)
            .to_rgb8();

        let outcome = self.backend.detect(frame.as_raw(), edge, edge)?;
        let budget_ms = self.settings.inference_budget.as_secs_f64() * 1000.0;
        if outcome.inference_ms > budget_ms {
            log::warn!(
                "inference took {:.0}ms, over the {:.0}ms budget",
                outcome.inference_ms,
                budget_ms
            );
        }

        let counts = class_counts(&outcome, &self.settings.class_names);
        let known: u64 = counts.values().map(|&c| c as u64).sum();
        if known < outcome.detections.len() as u64 {
            log::warn!(
                "{} detection(s) carried class ids outside the configured class list",
                outcome.detections.len() as u64 - known
            );
        }

        annotate_detections(&mut frame, &outcome.detections);
        let annotated_png = encode_png(&frame)?;

        if known == 0 {
            log::info!("no detections for {}", stored_path.display());
            return Ok(RunOutcome {
                counts,
                percentages: None,
                annotated_png,
                report_pdf: None,
                recorded: 0,
                record_failures: 0,
                stored_path,
            });
        }
        log::info!("detections: {}", summary::format_counts(&counts));

        // One row per detected instance, not per class per run.
        let mut recorded = 0u32;
        let mut record_failures = 0u32;
        for det in &outcome.detections {
            let Some(name) = self.settings.class_names.get(det.class_id) else {
                continue;
            };
            match self.store.record(name) {
                Ok(()) => recorded += 1,
                Err(err) => {
                    log::warn!("failed to record sighting '{}': {}", name, err);
                    record_failures += 1;
                }
            }
        }

        let percentages = stats::percentages(&counts)?;
        let report_pdf = report::generate(&annotated_png, &counts, &percentages)?;

        Ok(RunOutcome {
            counts,
            percentages: Some(percentages),
            annotated_png,
            report_pdf: Some(report_pdf),
            recorded,
            record_failures,
            stored_path,
        })
    }

    /// Historical totals per class from the persistence gateway.
    pub fn aggregate(&mut self) -> Result<Vec<ClassCount>> {
        self.store.aggregate()
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }
}

fn encode_png(frame: &RgbImage) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    frame
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .context("failed to encode annotated frame")?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::storage::InMemorySightingStore;
    use anyhow::anyhow;
    use image::Rgb;

    fn png_frame(value: u8) -> Vec<u8> {
        let frame = RgbImage::from_pixel(64, 64, Rgb([value, value, value]));
        let mut png = Vec::new();
        frame
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        png
    }

    fn pipeline_with_store(store: Box<dyn SightingStore>) -> (DetectionPipeline, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let settings = ModelSettings::default();
        let backend = StubBackend::new(settings.class_names.len());
        let pipeline =
            DetectionPipeline::new(Box::new(backend), store, settings, dir.path().to_path_buf());
        (pipeline, dir)
    }

    #[test]
    fn bright_image_records_every_instance_and_builds_the_report() {
        let (mut pipeline, _dir) = pipeline_with_store(Box::new(InMemorySightingStore::new()));
        let outcome = pipeline.process(&png_frame(255), "campo.png").unwrap();

        // 640/160 tiles per side → 16 instances split over two classes.
        assert_eq!(outcome.total_detections(), 16);
        assert_eq!(outcome.recorded, 16);
        assert_eq!(outcome.record_failures, 0);

        let percentages = outcome.percentages.as_ref().unwrap();
        assert_eq!(percentages["tuta"], "50.00%");
        assert_eq!(percentages["bactericera"], "50.00%");
        assert!(outcome.report_pdf.as_ref().unwrap().starts_with(b"%PDF"));

        let mut rows = pipeline.aggregate().unwrap();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(rows[0].count + rows[1].count, 16);
    }

    #[test]
    fn zero_detections_skip_persistence_and_percentages() {
        let (mut pipeline, _dir) = pipeline_with_store(Box::new(InMemorySightingStore::new()));
        let outcome = pipeline.process(&png_frame(0), "campo.png").unwrap();

        assert_eq!(outcome.total_detections(), 0);
        assert!(outcome.percentages.is_none());
        assert!(outcome.report_pdf.is_none());
        assert!(pipeline.aggregate().unwrap().is_empty());
        assert!(!outcome.annotated_png.is_empty());
    }

    #[test]
    fn undecodable_upload_aborts_the_run() {
        let (mut pipeline, _dir) = pipeline_with_store(Box::new(InMemorySightingStore::new()));
        assert!(pipeline.process(b"not an image", "campo.png").is_err());
    }

    /// Fails every second insert; the run must carry on regardless.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemorySightingStore,
        calls: u32,
    }

    impl SightingStore for FlakyStore {
        fn record(&mut self, class_name: &str) -> Result<()> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(anyhow!("constraint violation"));
            }
            self.inner.record(class_name)
        }

        fn aggregate(&mut self) -> Result<Vec<ClassCount>> {
            self.inner.aggregate()
        }
    }

    #[test]
    fn record_failures_do_not_abort_the_run() {
        let (mut pipeline, _dir) = pipeline_with_store(Box::<FlakyStore>::default());
        let outcome = pipeline.process(&png_frame(255), "campo.png").unwrap();

        assert_eq!(outcome.recorded, 8);
        assert_eq!(outcome.record_failures, 8);
        assert!(outcome.percentages.is_some());
        let total: u64 = pipeline
            .aggregate()
            .unwrap()
            .iter()
            .map(|row| row.count)
            .sum();
        assert_eq!(total, 8);
    }
}
