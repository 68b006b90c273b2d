//! Aggregate bar chart: one red bar per class, percentage annotations.

use anyhow::{anyhow, Result};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::io::Cursor;

use crate::storage::ClassCount;

const CHART_WIDTH: u32 = 1000;
const CHART_HEIGHT: u32 = 500;
const CHART_TITLE: &str = "Cantidad de Plagas Detectadas";

/// Render the historical aggregate as a PNG bar chart.
///
/// An empty aggregate (or one with zero total) is an error; the caller
/// maps it to a "no data" response instead of an empty figure.
pub fn render(rows: &[ClassCount]) -> Result<Vec<u8>> {
    let total: u64 = rows.iter().map(|row| row.count).sum();
    if rows.is_empty() || total == 0 {
        return Err(anyhow!("no sightings recorded yet"));
    }
    let max_count = rows.iter().map(|row| row.count).max().unwrap_or(0);
    // Headroom above the tallest bar for its annotation.
    let y_max = max_count + (max_count / 5).max(1);

    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| anyhow!("chart fill: {}", e))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(CHART_TITLE, ("sans-serif", 28))
            .margin(12)
            .x_label_area_size(48)
            .y_label_area_size(56)
            .build_cartesian_2d((0..rows.len()).into_segmented(), 0u64..y_max)
            .map_err(|e| anyhow!("chart axes: {}", e))?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc("Plaga")
            .y_desc("Cantidad")
            .x_labels(rows.len())
            .x_label_formatter(&|segment| match segment {
                SegmentValue::CenterOf(index) => rows
                    .get(*index)
                    .map(|row| row.name.clone())
                    .unwrap_or_default(),
                _ => String::new(),
            })
            .draw()
            .map_err(|e| anyhow!("chart mesh: {}", e))?;

        chart
            .draw_series(rows.iter().enumerate().map(|(index, row)| {
                Rectangle::new(
                    [
                        (SegmentValue::Exact(index), 0u64),
                        (SegmentValue::Exact(index + 1), row.count),
                    ],
                    RED.filled(),
                )
            }))
            .map_err(|e| anyhow!("chart bars: {}", e))?;

        let annotation_style = ("sans-serif", 16)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        chart
            .draw_series(rows.iter().enumerate().map(|(index, row)| {
                let share = (row.count as f64 / total as f64) * 100.0;
                Text::new(
                    format!("{:.2}%", share),
                    (SegmentValue::CenterOf(index), row.count),
                    annotation_style.clone(),
                )
            }))
            .map_err(|e| anyhow!("chart annotations: {}", e))?;

        root.present().map_err(|e| anyhow!("chart present: {}", e))?;
    }

    let frame = image::RgbImage::from_raw(CHART_WIDTH, CHART_HEIGHT, buffer)
        .ok_or_else(|| anyhow!("chart buffer size mismatch"))?;
    let mut png = Vec::new();
    frame
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| anyhow!("chart encode: {}", e))?;
    Ok(png)
}
