use doc_agent_evidence_renderer::{EvidenceResult, PdfDocument, PdfiumDocument};

/// Swaps the PDF backend behind `build_materials` without the builder
/// depending on a concrete decoder, mirroring the `PdfDocument` seam one
/// layer down.
pub trait PdfOpener: Send + Sync {
    fn open(&self, bytes: Vec<u8>) -> EvidenceResult<Box<dyn PdfDocument>>;
}

#[derive(Debug, Default)]
pub struct PdfiumOpener;

impl PdfOpener for PdfiumOpener {
    fn open(&self, bytes: Vec<u8>) -> EvidenceResult<Box<dyn PdfDocument>> {
        Ok(Box::new(PdfiumDocument::open(bytes)?))
    }
}
