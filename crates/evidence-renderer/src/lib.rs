//! Evidence Renderer & Cache (spec §4.3): deterministic PDF-to-PNG render
//! primitives memoised through a version-keyed on-disk cache.

pub mod error;
pub mod pdf;
pub mod render;

pub use error::{EvidenceError, EvidenceResult};
pub use pdf::{FakePdfDocument, PdfDocument, PdfiumDocument};
pub use render::{derive_source_version, render_overview_and_quadrants, render_roi, RenderParams, RenderedPng};

use doc_agent_render_cache::{CacheKey, RenderCache};

fn rendered_from_cached_bytes(bytes: Vec<u8>, bbox: Option<doc_agent_common::BoundingBox>) -> EvidenceResult<RenderedPng> {
    let (width, height) = image::load_from_memory(&bytes).map(|img| (img.width(), img.height())).unwrap_or((0, 0));
    Ok(RenderedPng { png_bytes: bytes, width, height, scale: 1.0, bbox })
}

/// Fetches an overview (and quadrants, if applicable) from `cache`, falling
/// back to rendering via `doc` on a miss and populating the cache on the
/// way out.
pub fn overview_cached(
    cache: &RenderCache,
    doc: &dyn PdfDocument,
    source_id: &str,
    source_version: &str,
    page: usize,
    dpi: u32,
    params: RenderParams,
) -> EvidenceResult<(RenderedPng, Vec<RenderedPng>)> {
    let overview_key = CacheKey::new(source_id, source_version, page as u32, dpi, None);
    if let Some(bytes) = cache.get(&overview_key).ok().flatten() {
        // Quadrants are cached independently; a cached overview with no
        // cached quadrants just means none were emitted for this page.
        let quadrants = render::QUADRANT_WINDOWS
            .iter()
            .filter_map(|&(x1, y1, x2, y2)| doc_agent_common::BoundingBox::clamped(x1, y1, x2, y2))
            .filter_map(|bbox| {
                let key = CacheKey::new(source_id, source_version, page as u32, dpi, Some(bbox));
                cache.get(&key).ok().flatten().and_then(|bytes| rendered_from_cached_bytes(bytes, Some(bbox)).ok())
            })
            .collect::<Vec<_>>();
        return Ok((rendered_from_cached_bytes(bytes, None)?, quadrants));
    }

    let (overview, quadrants) = render_overview_and_quadrants(doc, page, dpi, params)?;
    let _ = cache.put(&overview_key, &overview.png_bytes);
    for quadrant in &quadrants {
        if let Some(bbox) = quadrant.bbox {
            let key = CacheKey::new(source_id, source_version, page as u32, dpi, Some(bbox));
            let _ = cache.put(&key, &quadrant.png_bytes);
        }
    }
    Ok((overview, quadrants))
}

/// Fetches a region-of-interest crop from `cache`, falling back to
/// rendering via `doc` on a miss.
pub fn roi_cached(
    cache: &RenderCache,
    doc: &dyn PdfDocument,
    source_id: &str,
    source_version: &str,
    bbox: &doc_agent_common::BoundingBox,
    dpi: u32,
) -> EvidenceResult<RenderedPng> {
    let key = CacheKey::new(source_id, source_version, 0, dpi.clamp(72, 400), Some(*bbox));
    if let Some(bytes) = cache.get(&key).ok().flatten() {
        return rendered_from_cached_bytes(bytes, Some(*bbox));
    }
    let rendered = render_roi(doc, bbox, dpi)?;
    let _ = cache.put(&key, &rendered.png_bytes);
    Ok(rendered)
}
