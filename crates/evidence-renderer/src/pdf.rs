//! The `PdfDocument` seam (spec §4.3.1): keeps the rasterizer swappable
//! behind a trait so cache and builder logic never touch a concrete PDF
//! library directly, the same seam the teacher's `PdfBackend` trait gives
//! its render worker.

use image::RgbImage;

use crate::error::{EvidenceError, EvidenceResult};

pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> usize;

    /// Renders `page` (0-indexed) at `zoom` (dpi / 72) into an RGB image.
    fn render_page(&self, page: usize, zoom: f64) -> EvidenceResult<RgbImage>;
}

/// Loads PDF bytes with `pdfium-render` and rasterizes pages on demand. The
/// `pdfium_render::prelude::PdfDocument` handle borrows from `Pdfium`, so it
/// is reopened from the held bytes on every call rather than stored across
/// the struct boundary.
pub struct PdfiumDocument {
    pdfium: pdfium_render::prelude::Pdfium,
    bytes: Vec<u8>,
}

impl PdfiumDocument {
    /// Binds a pdfium library (resolved via the platform default search path)
    /// and holds `bytes` for on-demand parsing.
    pub fn open(bytes: Vec<u8>) -> EvidenceResult<Self> {
        use pdfium_render::prelude::Pdfium;

        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|err| EvidenceError::Render(err.to_string()))?;
        Ok(Self { pdfium: Pdfium::new(bindings), bytes })
    }
}

impl PdfDocument for PdfiumDocument {
    fn page_count(&self) -> usize {
        match self.pdfium.load_pdf_from_byte_slice(&self.bytes, None) {
            Ok(document) => document.pages().len() as usize,
            Err(_) => 0,
        }
    }

    fn render_page(&self, page: usize, zoom: f64) -> EvidenceResult<RgbImage> {
        use pdfium_render::prelude::*;

        let document = self
            .pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(|err| EvidenceError::Render(err.to_string()))?;
        let pages = document.pages();
        let page_ref = pages.get(page as u16).map_err(|_| EvidenceError::PageOutOfRange { page })?;

        let width_pt = page_ref.width().value as f64;
        let height_pt = page_ref.height().value as f64;
        let width_px = (width_pt * zoom).floor().max(1.0) as u16;
        let height_px = (height_pt * zoom).floor().max(1.0) as u16;

        let config = PdfRenderConfig::new()
            .set_target_width(width_px)
            .set_target_height(height_px);
        let bitmap = page_ref
            .render_with_config(&config)
            .map_err(|err| EvidenceError::Render(err.to_string()))?;
        Ok(bitmap.as_image().to_rgb8())
    }
}

/// A synthetic gradient "document" for tests, so render-pipeline logic can
/// be exercised without a real PDF parser in the loop.
pub struct FakePdfDocument {
    pub pages: Vec<(u32, u32)>,
}

impl FakePdfDocument {
    #[must_use]
    pub fn single_page(width: u32, height: u32) -> Self {
        Self { pages: vec![(width, height)] }
    }
}

impl PdfDocument for FakePdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn render_page(&self, page: usize, zoom: f64) -> EvidenceResult<RgbImage> {
        let (base_w, base_h) = *self.pages.get(page).ok_or(EvidenceError::PageOutOfRange { page })?;
        let width = ((base_w as f64) * zoom).floor().max(1.0) as u32;
        let height = ((base_h as f64) * zoom).floor().max(1.0) as u32;
        Ok(RgbImage::from_fn(width, height, |x, y| {
            let r = ((x * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            image::Rgb([r, g, 128])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_document_scales_by_zoom() {
        let doc = FakePdfDocument::single_page(612, 792);
        let image = doc.render_page(0, 1.0).unwrap();
        assert_eq!((image.width(), image.height()), (612, 792));

        let zoomed = doc.render_page(0, 2.0).unwrap();
        assert_eq!((zoomed.width(), zoomed.height()), (1224, 1584));
    }

    #[test]
    fn fake_document_rejects_out_of_range_page() {
        let doc = FakePdfDocument::single_page(100, 100);
        assert!(matches!(doc.render_page(1, 1.0), Err(EvidenceError::PageOutOfRange { page: 1 })));
    }
}
