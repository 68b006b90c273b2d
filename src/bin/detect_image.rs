//! detect_image - one-shot detection run against a local image.
//!
//! Runs the same pipeline as the service for a single file: detect,
//! optionally record sightings, and write the annotated frame, the PDF
//! report and the aggregate chart next to wherever the flags point.
//! `--verify-counts` compares the run against a previously recorded
//! summary line and fails the process on mismatch, which makes it usable
//! as a model regression check.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use plagascan::detect::summary;
use plagascan::pipeline::DetectionPipeline;
use plagascan::storage::{InMemorySightingStore, SightingStore, SqliteSightingStore};
use plagascan::{chart, select_backend, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "detect_image", about = "Run pest detection on one image")]
struct Args {
    /// Image to analyze (jpg, jpeg or png).
    image: PathBuf,

    /// Record detected instances into the configured database instead of
    /// keeping the run in memory.
    #[arg(long)]
    record: bool,

    /// Write the annotated frame here.
    #[arg(long)]
    annotated_out: Option<PathBuf>,

    /// Write the PDF report here.
    #[arg(long)]
    report_out: Option<PathBuf>,

    /// Write the aggregate chart here (implies reading the aggregate
    /// after the run).
    #[arg(long)]
    chart_out: Option<PathBuf>,

    /// Expected summary line, e.g. "3 tuta 5 bactericera"; the run fails
    /// when the detected counts differ.
    #[arg(long)]
    verify_counts: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = AppConfig::load()?;

    let store: Box<dyn SightingStore> = if args.record {
        Box::new(SqliteSightingStore::open(&config.db_path)?)
    } else {
        Box::new(InMemorySightingStore::new())
    };
    let backend = select_backend(&config.model)?;

    let image_bytes = std::fs::read(&args.image)
        .map_err(|e| anyhow!("failed to read {}: {}", args.image.display(), e))?;
    let original_name = args
        .image
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("image path has no usable file name"))?
        .to_string();

    let mut pipeline = DetectionPipeline::new(
        backend,
        store,
        config.model.clone(),
        config.upload_dir.clone(),
    );
    let outcome = pipeline.process(&image_bytes, &original_name)?;

    let summary_line = summary::format_counts(&outcome.counts);
    if outcome.total_detections() == 0 {
        println!("no detections");
    } else {
        println!("detections: {}", summary_line);
        if let Some(percentages) = &outcome.percentages {
            for (name, share) in percentages {
                println!("  {}: {}", name, share);
            }
        }
        println!(
            "recorded {} instance(s), {} failure(s)",
            outcome.recorded, outcome.record_failures
        );
    }

    if let Some(path) = &args.annotated_out {
        std::fs::write(path, &outcome.annotated_png)?;
        println!("annotated frame written to {}", path.display());
    }
    if let Some(path) = &args.report_out {
        match &outcome.report_pdf {
            Some(pdf) => {
                std::fs::write(path, pdf)?;
                println!("report written to {}", path.display());
            }
            None => println!("no report: the image produced no detections"),
        }
    }
    if let Some(path) = &args.chart_out {
        let rows = pipeline.aggregate()?;
        match chart::render(&rows) {
            Ok(png) => {
                std::fs::write(path, png)?;
                println!("chart written to {}", path.display());
            }
            Err(err) => println!("no chart: {}", err),
        }
    }

    if let Some(expected) = &args.verify_counts {
        let expected_counts = summary::parse_counts(expected);
        if expected_counts != outcome.counts {
            return Err(anyhow!(
                "count mismatch: expected '{}', detected '{}'",
                summary::format_counts(&expected_counts),
                summary_line
            ));
        }
        println!("counts match the expected summary");
    }

    Ok(())
}
