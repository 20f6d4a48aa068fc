//! Per-item resolve/fetch/verify/render/upload pipeline (spec §4.4).

use doc_agent_common::{BlockId, BoundingBox, ImageKind, ImageRequest, MaterialImage, MaterialsPayload, RoiRequest};
use doc_agent_dialog_logger::DialogLogger;
use doc_agent_evidence_renderer::render::RenderParams;
use doc_agent_render_cache::RenderCache;
use tracing::warn;

use crate::error::{MaterialsError, MaterialsResult};
use crate::pdf_opener::PdfOpener;
use crate::storage_seam::{CropSource, MaterialsStorage};

struct ResolvedRender {
    block_id: BlockId,
    kind: ImageKind,
    bbox: Option<BoundingBox>,
    png_bytes: Vec<u8>,
    width: u32,
    height: u32,
    scale: f64,
}

/// Builds a `MaterialsPayload` for the given image/ROI requests, merging
/// into `existing` (the prior iteration's materials, if any). Failures are
/// per-item: one bad block never aborts the rest of the batch. `artifact_missing`
/// skips (spec §7) are recorded to the chat's dialog log under `MISSING_CROP` /
/// `NON_PDF_CROP` in addition to the operational `tracing::warn!`.
#[allow(clippy::too_many_arguments)]
pub async fn build_materials(
    storage: &dyn MaterialsStorage,
    cache: &RenderCache,
    opener: &dyn PdfOpener,
    dialog_logger: &DialogLogger,
    chat_id: &str,
    render_params: RenderParams,
    image_requests: &[ImageRequest],
    roi_requests: &[RoiRequest],
    existing: MaterialsPayload,
) -> MaterialsPayload {
    let mut resolved = Vec::new();

    for request in image_requests {
        match resolve_image(storage, cache, opener, render_params, request).await {
            Ok(renders) => resolved.extend(renders),
            Err(err) => {
                warn!(block_id = %request.block_id.as_str(), %err, "skipping image request");
                log_artifact_skip(dialog_logger, chat_id, request.block_id.as_str(), &err).await;
            }
        }
    }

    for request in roi_requests {
        match resolve_roi(storage, cache, opener, request).await {
            Ok(render) => resolved.push(render),
            Err(err) => {
                warn!(block_id = %request.block_id.as_str(), %err, "skipping roi request");
                log_artifact_skip(dialog_logger, chat_id, request.block_id.as_str(), &err).await;
            }
        }
    }

    let mut fresh = MaterialsPayload::default();
    for render in resolved {
        let bbox_fragment = render.bbox.map(|b| b.cache_fragment());
        let already_present = existing
            .images
            .iter()
            .any(|img| img.dedup_key() == (render.block_id.clone(), render.kind, bbox_fragment.clone()))
            || fresh
                .images
                .iter()
                .any(|img| img.dedup_key() == (render.block_id.clone(), render.kind, bbox_fragment.clone()));
        if already_present {
            continue;
        }

        let file_name = format!("{}_{}", render.block_id.as_str(), uuid::Uuid::new_v4());
        let (llm_ref, object_store_result) = tokio::join!(
            storage.upload_to_llm(&render.png_bytes, &file_name),
            storage.upload_to_object_store(&render.png_bytes, &file_name),
        );
        let llm_ref = match llm_ref {
            Ok(reference) => reference,
            Err(err) => {
                warn!(block_id = %render.block_id.as_str(), %err, "llm upload failed, skipping render");
                continue;
            }
        };
        let public_url = match object_store_result {
            Ok((_, url)) => url,
            Err(err) => {
                warn!(block_id = %render.block_id.as_str(), %err, "object store upload failed, continuing without public url");
                None
            }
        };

        fresh.images.push(MaterialImage {
            block_id: render.block_id,
            kind: render.kind,
            uploaded_file_ref: llm_ref,
            public_url,
            width: render.width,
            height: render.height,
            scale: render.scale,
            bbox: render.bbox,
        });
    }

    let mut merged = existing;
    merged.merge(fresh);
    merged
}

/// Records an `artifact_missing` skip to the chat's dialog log under the
/// section name spec §7 calls for; other error kinds are left to `tracing`
/// alone, since they aren't the crop-retrieval failures that section names.
async fn log_artifact_skip(dialog_logger: &DialogLogger, chat_id: &str, block_id: &str, err: &MaterialsError) {
    let section = match err {
        MaterialsError::CropNotFound(_) => "MISSING_CROP",
        MaterialsError::NotAPdf => "NON_PDF_CROP",
        _ => return,
    };
    let _ = dialog_logger.log_text(chat_id, section, &format!("block {block_id}: {err}")).await;
}

async fn locate_and_fetch(storage: &dyn MaterialsStorage, block_id: &BlockId) -> MaterialsResult<Vec<u8>> {
    let source = storage
        .locate_crop_source(block_id)
        .await?
        .ok_or_else(|| MaterialsError::CropNotFound(block_id.as_str().to_string()))?;
    let bytes = storage
        .fetch_bytes(&source)
        .await?
        .ok_or_else(|| MaterialsError::CropNotFound(block_id.as_str().to_string()))?;
    verify_pdf_header(&bytes, &source)?;
    Ok(bytes)
}

fn verify_pdf_header(bytes: &[u8], _source: &CropSource) -> MaterialsResult<()> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(MaterialsError::NotAPdf)
    }
}

async fn resolve_image(
    storage: &dyn MaterialsStorage,
    cache: &RenderCache,
    opener: &dyn PdfOpener,
    render_params: RenderParams,
    request: &ImageRequest,
) -> MaterialsResult<Vec<ResolvedRender>> {
    let bytes = locate_and_fetch(storage, &request.block_id).await?;
    let source_version = doc_agent_evidence_renderer::derive_source_version(&bytes);
    let document = opener.open(bytes)?;

    let (overview, quadrants) = doc_agent_evidence_renderer::overview_cached(
        cache,
        document.as_ref(),
        request.block_id.as_str(),
        &source_version,
        0,
        300,
        render_params,
    )?;

    let mut renders = vec![ResolvedRender {
        block_id: request.block_id.clone(),
        kind: ImageKind::Overview,
        bbox: None,
        width: overview.width,
        height: overview.height,
        scale: overview.scale,
        png_bytes: overview.png_bytes,
    }];
    for quadrant in quadrants {
        renders.push(ResolvedRender {
            block_id: request.block_id.clone(),
            kind: ImageKind::Quadrant,
            bbox: quadrant.bbox,
            width: quadrant.width,
            height: quadrant.height,
            scale: quadrant.scale,
            png_bytes: quadrant.png_bytes,
        });
    }
    Ok(renders)
}

async fn resolve_roi(
    storage: &dyn MaterialsStorage,
    cache: &RenderCache,
    opener: &dyn PdfOpener,
    request: &RoiRequest,
) -> MaterialsResult<ResolvedRender> {
    let bytes = locate_and_fetch(storage, &request.block_id).await?;
    let source_version = doc_agent_evidence_renderer::derive_source_version(&bytes);
    let document = opener.open(bytes)?;

    let bbox = BoundingBox::clamped(request.bbox.x1, request.bbox.y1, request.bbox.x2, request.bbox.y2)
        .ok_or(MaterialsError::Render(doc_agent_evidence_renderer::EvidenceError::DegenerateBbox))?;
    let dpi = request.dpi.unwrap_or(300).clamp(72, 400);

    let rendered = doc_agent_evidence_renderer::roi_cached(
        cache,
        document.as_ref(),
        request.block_id.as_str(),
        &source_version,
        &bbox,
        dpi,
    )?;

    Ok(ResolvedRender {
        block_id: request.block_id.clone(),
        kind: ImageKind::Roi,
        bbox: Some(bbox),
        width: rendered.width,
        height: rendered.height,
        scale: rendered.scale,
        png_bytes: rendered.png_bytes,
    })
}
