//! Render primitives (spec §4.3): overview, quadrant and ROI crops over a
//! rasterized PDF page.

use doc_agent_common::BoundingBox;
use image::{imageops::FilterType, RgbImage};
use sha2::{Digest, Sha256};

use crate::error::{EvidenceError, EvidenceResult};
use crate::pdf::PdfDocument;

/// The four overlapping quadrant windows, applied to the full page image.
pub const QUADRANT_WINDOWS: [(f64, f64, f64, f64); 4] = [
    (0.0, 0.0, 0.55, 0.55),
    (0.45, 0.0, 1.0, 0.55),
    (0.0, 0.45, 0.55, 1.0),
    (0.45, 0.45, 1.0, 1.0),
];

const BASE_DPI: f64 = 72.0;

#[derive(Debug, Clone, Copy)]
pub struct RenderParams {
    pub preview_max_side: u32,
    pub zoom_preview_max_side: u32,
    pub auto_quadrants_threshold: f64,
}

/// One rendered PNG plus the scale factor actually applied and its pixel
/// dimensions, suitable for populating a `MaterialImage`.
pub struct RenderedPng {
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub bbox: Option<BoundingBox>,
}

/// Renders the overview (and, if the page is dense enough, the four
/// quadrants) for `page` of `doc`, at `dpi` (default 300 at the call site).
pub fn render_overview_and_quadrants(
    doc: &dyn PdfDocument,
    page: usize,
    dpi: u32,
    params: RenderParams,
) -> EvidenceResult<(RenderedPng, Vec<RenderedPng>)> {
    let base = doc.render_page(page, f64::from(dpi) / BASE_DPI)?;
    let (base_w, base_h) = (base.width(), base.height());
    let max_side = base_w.max(base_h) as f64;

    let overview_scale = if max_side <= f64::from(params.preview_max_side) {
        1.0
    } else {
        f64::from(params.preview_max_side) / max_side
    };
    let overview = resize_image(&base, overview_scale);
    let overview_png = RenderedPng {
        png_bytes: encode_png(&overview)?,
        width: overview.width(),
        height: overview.height(),
        scale: overview_scale,
        bbox: None,
    };

    let scale_down_factor = if overview_scale > 0.0 { 1.0 / overview_scale } else { 1.0 };
    let mut quadrants = Vec::new();
    if scale_down_factor > params.auto_quadrants_threshold {
        for (x1, y1, x2, y2) in QUADRANT_WINDOWS {
            let bbox = BoundingBox::clamped(x1, y1, x2, y2).ok_or(EvidenceError::DegenerateBbox)?;
            let crop = crop_normalised(&base, &bbox);
            let crop_max_side = crop.width().max(crop.height()) as f64;
            let quadrant_scale = if crop_max_side <= f64::from(params.zoom_preview_max_side) {
                1.0
            } else {
                f64::from(params.zoom_preview_max_side) / crop_max_side
            };
            let resized = resize_image(&crop, quadrant_scale);
            quadrants.push(RenderedPng {
                png_bytes: encode_png(&resized)?,
                width: resized.width(),
                height: resized.height(),
                scale: quadrant_scale,
                bbox: Some(bbox),
            });
        }
    }

    Ok((overview_png, quadrants))
}

/// Renders a single region-of-interest crop. `page` is always `0` for crop
/// PDFs (single-page extracts); `dpi` is clamped to `[72, 400]`.
pub fn render_roi(doc: &dyn PdfDocument, bbox: &BoundingBox, dpi: u32) -> EvidenceResult<RenderedPng> {
    let dpi = dpi.clamp(72, 400);
    let base = doc.render_page(0, f64::from(dpi) / BASE_DPI)?;
    let crop = crop_normalised(&base, bbox);
    if crop.width() == 0 || crop.height() == 0 {
        return Err(EvidenceError::DegenerateBbox);
    }
    Ok(RenderedPng {
        png_bytes: encode_png(&crop)?,
        width: crop.width(),
        height: crop.height(),
        scale: 1.0,
        bbox: Some(*bbox),
    })
}

fn resize_image(image: &RgbImage, scale: f64) -> RgbImage {
    if (scale - 1.0).abs() < f64::EPSILON {
        return image.clone();
    }
    let width = ((image.width() as f64) * scale).floor().max(1.0) as u32;
    let height = ((image.height() as f64) * scale).floor().max(1.0) as u32;
    image::imageops::resize(image, width, height, FilterType::Lanczos3)
}

fn crop_normalised(image: &RgbImage, bbox: &BoundingBox) -> RgbImage {
    let (w, h) = (image.width() as f64, image.height() as f64);
    let x = (bbox.x1 * w).floor().max(0.0) as u32;
    let y = (bbox.y1 * h).floor().max(0.0) as u32;
    let crop_w = (((bbox.x2 - bbox.x1) * w).floor().max(0.0) as u32).min(image.width().saturating_sub(x));
    let crop_h = (((bbox.y2 - bbox.y1) * h).floor().max(0.0) as u32).min(image.height().saturating_sub(y));
    image::imageops::crop_imm(image, x, y, crop_w.max(1), crop_h.max(1)).to_image()
}

fn encode_png(image: &RgbImage) -> EvidenceResult<Vec<u8>> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

/// Derives a `source_version` from PDF bytes: first 16 hex chars of SHA-256.
#[must_use]
pub fn derive_source_version(pdf_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pdf_bytes);
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::FakePdfDocument;

    fn default_params() -> RenderParams {
        RenderParams { preview_max_side: 2000, zoom_preview_max_side: 2000, auto_quadrants_threshold: 2.5 }
    }

    #[test]
    fn overview_downscales_large_pages_and_skips_quadrants_below_threshold() {
        let doc = FakePdfDocument::single_page(2075, 1600);
        let (overview, quadrants) = render_overview_and_quadrants(&doc, 0, 72, default_params()).unwrap();
        assert!(overview.width <= 2000 && overview.height <= 2000);
        assert!(quadrants.is_empty());
    }

    #[test]
    fn quadrants_emitted_when_scale_down_exceeds_threshold() {
        let doc = FakePdfDocument::single_page(6000, 4000);
        let (_overview, quadrants) = render_overview_and_quadrants(&doc, 0, 72, default_params()).unwrap();
        assert_eq!(quadrants.len(), 4);
        for q in &quadrants {
            assert!(q.width > 0);
            assert!(q.bbox.is_some());
        }
    }

    #[test]
    fn roi_clamps_dpi_and_crops_normalised_bbox() {
        let doc = FakePdfDocument::single_page(1000, 1000);
        let bbox = BoundingBox::clamped(0.0, 0.0, 0.5, 0.5).unwrap();
        let roi = render_roi(&doc, &bbox, 1000).unwrap();
        assert!(roi.width > 0 && roi.height > 0);
    }

    #[test]
    fn source_version_is_deterministic() {
        let a = derive_source_version(b"hello");
        let b = derive_source_version(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }
}
