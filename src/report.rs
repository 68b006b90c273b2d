//! PDF detection report: title, annotated image, one line per class.

use anyhow::{anyhow, Result};
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::{BuiltinFont, Image, ImageTransform, Mm, PdfDocument, Pt};
use std::collections::BTreeMap;
use std::io::Cursor;

/// Download filename offered for the generated report.
pub const REPORT_FILENAME: &str = "informe_deteccion.pdf";

const REPORT_TITLE: &str = "Informe de Detección de Tuta absoluta y Bactericera Cockerelli";

// US-Letter geometry, in points.
const PAGE_WIDTH_PT: f32 = 612.0;
const PAGE_HEIGHT_PT: f32 = 792.0;
const TITLE_OFFSET_PT: f32 = 30.0;
const TITLE_FONT_PT: f32 = 16.0;
const BODY_FONT_PT: f32 = 12.0;
const IMAGE_EDGE_PT: f32 = 320.0;
const IMAGE_GAP_PT: f32 = 50.0;
const LINE_STEP_PT: f32 = 10.0;
const BOTTOM_MARGIN_PT: f32 = 40.0;

// Builtin fonts carry no metrics; centering uses an average glyph width.
const HELVETICA_AVG_WIDTH: f32 = 0.55;

/// One report line for a class.
pub fn class_line(name: &str, count: u32, percentage: &str) -> String {
    format!("{}: {} detecciones - {}", name, count, percentage)
}

/// Render the single-document PDF report.
///
/// `annotated_png` is the annotated detection frame as PNG bytes. Classes
/// missing from `percentages` render with an empty percentage column
/// rather than failing the report. When the class list would run past the
/// bottom margin, the layout breaks onto a new page and continues.
pub fn generate(
    annotated_png: &[u8],
    counts: &BTreeMap<String, u32>,
    percentages: &BTreeMap<String, String>,
) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(
        REPORT_TITLE,
        Mm::from(Pt(PAGE_WIDTH_PT)),
        Mm::from(Pt(PAGE_HEIGHT_PT)),
        "informe",
    );
    let title_font = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| anyhow!("pdf font: {}", e))?;
    let body_font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("pdf font: {}", e))?;
    let mut current_layer = doc.get_page(page).get_layer(layer);

    let title_y = PAGE_HEIGHT_PT - TITLE_OFFSET_PT;
    let title_width = REPORT_TITLE.chars().count() as f32 * TITLE_FONT_PT * HELVETICA_AVG_WIDTH;
    let title_x = ((PAGE_WIDTH_PT - title_width) / 2.0).max(0.0);
    current_layer.use_text(
        REPORT_TITLE,
        TITLE_FONT_PT,
        Mm::from(Pt(title_x)),
        Mm::from(Pt(title_y)),
        &title_font,
    );

    let decoder = PngDecoder::new(Cursor::new(annotated_png))
        .map_err(|e| anyhow!("report image decode: {}", e))?;
    let image = Image::try_from(decoder).map_err(|e| anyhow!("report image: {}", e))?;
    let (px_width, px_height) = (
        image.image.width.0.max(1) as f32,
        image.image.height.0.max(1) as f32,
    );

    let image_x = (PAGE_WIDTH_PT - IMAGE_EDGE_PT) / 2.0;
    let image_y = PAGE_HEIGHT_PT - TITLE_OFFSET_PT - IMAGE_GAP_PT - IMAGE_EDGE_PT;
    image.add_to_layer(
        current_layer.clone(),
        ImageTransform {
            translate_x: Some(Mm::from(Pt(image_x))),
            translate_y: Some(Mm::from(Pt(image_y))),
            // At 72 dpi one pixel is one point; scale the bitmap into the
            // fixed bounding box.
            dpi: Some(72.0),
            scale_x: Some(IMAGE_EDGE_PT / px_width),
            scale_y: Some(IMAGE_EDGE_PT / px_height),
            ..Default::default()
        },
    );

    current_layer.use_text(
        "Detecciones por Clase:",
        BODY_FONT_PT,
        Mm::from(Pt(image_x)),
        Mm::from(Pt(image_y - 30.0)),
        &body_font,
    );

    let mut y = image_y - 45.0;
    for (name, count) in counts {
        if y < BOTTOM_MARGIN_PT {
            let (next_page, next_layer) = doc.add_page(
                Mm::from(Pt(PAGE_WIDTH_PT)),
                Mm::from(Pt(PAGE_HEIGHT_PT)),
                "informe",
            );
            current_layer = doc.get_page(next_page).get_layer(next_layer);
            y = PAGE_HEIGHT_PT - BOTTOM_MARGIN_PT;
        }
        let percentage = percentages.get(name).map(String::as_str).unwrap_or("");
        current_layer.use_text(
            class_line(name, *count, percentage),
            BODY_FONT_PT,
            Mm::from(Pt(image_x)),
            Mm::from(Pt(y)),
            &body_font,
        );
        y -= LINE_STEP_PT;
    }

    doc.save_to_bytes().map_err(|e| anyhow!("pdf save: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample_png() -> Vec<u8> {
        let frame = RgbImage::from_pixel(64, 64, Rgb([30, 120, 30]));
        let mut png = Vec::new();
        frame
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        png
    }

    fn table(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn class_lines_carry_counts_and_percentages_verbatim() {
        assert_eq!(
            class_line("tuta", 4, "40.00%"),
            "tuta: 4 detecciones - 40.00%"
        );
        assert_eq!(
            class_line("bactericera", 6, "60.00%"),
            "bactericera: 6 detecciones - 60.00%"
        );
    }

    #[test]
    fn generates_a_pdf_document() {
        let mut counts = BTreeMap::new();
        counts.insert("tuta".to_string(), 4u32);
        counts.insert("bactericera".to_string(), 6u32);
        let percentages = table(&[("tuta", "40.00%"), ("bactericera", "60.00%")]);

        let pdf = generate(&sample_png(), &counts, &percentages).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert!(pdf.len() > 1024);
    }

    #[test]
    fn long_class_lists_paginate_instead_of_failing() {
        let mut counts = BTreeMap::new();
        let mut percentages = BTreeMap::new();
        for i in 0..80 {
            counts.insert(format!("plaga_{:02}", i), 1u32);
            percentages.insert(format!("plaga_{:02}", i), "1.25%".to_string());
        }
        let pdf = generate(&sample_png(), &counts, &percentages).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }
}
