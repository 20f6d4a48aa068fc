//! Materials Builder (spec §4.4): resolves requested images/ROIs to
//! rendered PNGs via cache → render → upload, assembling the
//! `MaterialsPayload` delivered to the answerer.

pub mod builder;
pub mod error;
pub mod pdf_opener;
pub mod storage_seam;

pub use builder::build_materials;
pub use error::{MaterialsError, MaterialsResult};
pub use pdf_opener::{PdfOpener, PdfiumOpener};
pub use storage_seam::{CropSource, MaterialsStorage};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use doc_agent_common::config::DialogLogConfig;
    use doc_agent_common::{BlockId, ImageRequest};
    use doc_agent_dialog_logger::DialogLogger;
    use doc_agent_evidence_renderer::render::RenderParams;
    use doc_agent_evidence_renderer::{EvidenceResult, FakePdfDocument, PdfDocument};

    use super::*;

    fn test_dialog_logger(dir: &std::path::Path) -> DialogLogger {
        DialogLogger::new(&DialogLogConfig { log_dir: dir.to_string_lossy().to_string(), truncate_chars: 4000 })
    }

    struct FakeStorage {
        crops: HashMap<String, Vec<u8>>,
        uploads: Mutex<u32>,
    }

    #[async_trait]
    impl MaterialsStorage for FakeStorage {
        async fn locate_crop_source(&self, block_id: &BlockId) -> MaterialsResult<Option<CropSource>> {
            Ok(self.crops.contains_key(block_id.as_str()).then(|| CropSource::ObjectKey(block_id.as_str().to_string())))
        }

        async fn fetch_bytes(&self, source: &CropSource) -> MaterialsResult<Option<Vec<u8>>> {
            let CropSource::ObjectKey(key) = source else { return Ok(None) };
            Ok(self.crops.get(key).cloned())
        }

        async fn upload_to_llm(&self, _png_bytes: &[u8], file_name: &str) -> MaterialsResult<String> {
            *self.uploads.lock().unwrap() += 1;
            Ok(format!("llm-file://{file_name}"))
        }

        async fn upload_to_object_store(&self, _png_bytes: &[u8], file_name: &str) -> MaterialsResult<(String, Option<String>)> {
            Ok((format!("chat_images/{file_name}.png"), Some(format!("https://cdn.example/{file_name}.png"))))
        }
    }

    struct FakeOpener;

    impl PdfOpener for FakeOpener {
        fn open(&self, _bytes: Vec<u8>) -> EvidenceResult<Box<dyn PdfDocument>> {
            Ok(Box::new(FakePdfDocument::single_page(1000, 1000)))
        }
    }

    fn render_params() -> RenderParams {
        RenderParams { preview_max_side: 2000, zoom_preview_max_side: 2000, auto_quadrants_threshold: 2.5 }
    }

    #[tokio::test]
    async fn missing_crop_is_skipped_not_fatal() {
        let storage = FakeStorage { crops: HashMap::new(), uploads: Mutex::new(0) };
        let tmp = tempfile::tempdir().unwrap();
        let cache = doc_agent_render_cache::RenderCache::open(tmp.path(), 10, 14).unwrap();
        let opener = FakeOpener;
        let logger = test_dialog_logger(tmp.path());

        let request = ImageRequest { block_id: BlockId::parse("AAAA-BBBB-001").unwrap() };
        let payload = build_materials(&storage, &cache, &opener, &logger, "chat-1", render_params(), &[request], &[], Default::default()).await;

        assert!(payload.images.is_empty());
        let log = tokio::fs::read_to_string(logger.log_path("chat-1")).await.unwrap();
        assert!(log.contains("MISSING_CROP"));
    }

    #[tokio::test]
    async fn resolved_image_is_uploaded_and_added_to_payload() {
        let mut crops = HashMap::new();
        crops.insert("AAAA-BBBB-001".to_string(), b"%PDF-1.4 fake".to_vec());
        let storage = FakeStorage { crops, uploads: Mutex::new(0) };
        let tmp = tempfile::tempdir().unwrap();
        let cache = doc_agent_render_cache::RenderCache::open(tmp.path(), 10, 14).unwrap();
        let opener = FakeOpener;
        let logger = test_dialog_logger(tmp.path());

        let request = ImageRequest { block_id: BlockId::parse("AAAA-BBBB-001").unwrap() };
        let payload = build_materials(&storage, &cache, &opener, &logger, "chat-1", render_params(), &[request], &[], Default::default()).await;

        assert_eq!(payload.images.len(), 1);
        assert!(payload.images[0].uploaded_file_ref.starts_with("llm-file://"));
        assert_eq!(*storage.uploads.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_skipped() {
        let mut crops = HashMap::new();
        crops.insert("AAAA-BBBB-001".to_string(), b"not a pdf".to_vec());
        let storage = FakeStorage { crops, uploads: Mutex::new(0) };
        let tmp = tempfile::tempdir().unwrap();
        let cache = doc_agent_render_cache::RenderCache::open(tmp.path(), 10, 14).unwrap();
        let opener = FakeOpener;
        let logger = test_dialog_logger(tmp.path());

        let request = ImageRequest { block_id: BlockId::parse("AAAA-BBBB-001").unwrap() };
        let payload = build_materials(&storage, &cache, &opener, &logger, "chat-1", render_params(), &[request], &[], Default::default()).await;

        assert!(payload.images.is_empty());
        let log = tokio::fs::read_to_string(logger.log_path("chat-1")).await.unwrap();
        assert!(log.contains("NON_PDF_CROP"));
    }

    #[tokio::test]
    async fn rerequesting_same_image_does_not_reupload() {
        let mut crops = HashMap::new();
        crops.insert("AAAA-BBBB-001".to_string(), b"%PDF-1.4 fake".to_vec());
        let storage = FakeStorage { crops, uploads: Mutex::new(0) };
        let tmp = tempfile::tempdir().unwrap();
        let cache = doc_agent_render_cache::RenderCache::open(tmp.path(), 10, 14).unwrap();
        let opener = FakeOpener;
        let logger = test_dialog_logger(tmp.path());

        let request = ImageRequest { block_id: BlockId::parse("AAAA-BBBB-001").unwrap() };
        let first = build_materials(&storage, &cache, &opener, &logger, "chat-1", render_params(), &[request.clone()], &[], Default::default()).await;
        let second = build_materials(&storage, &cache, &opener, &logger, "chat-1", render_params(), &[request], &[], first).await;

        assert_eq!(second.images.len(), 1);
        assert_eq!(*storage.uploads.lock().unwrap(), 1, "second pass should not re-upload the already-present render");
    }
}
