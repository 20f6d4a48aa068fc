//! HTML Crop Map Extractor (spec §4.3): recovers a `block_id → crop_url`
//! fallback index from the HTML OCR mirror of a document.
//!
//! The blocks-index manifest is authoritative; this index is consulted only
//! when a block is missing from it. The HTML OCR mirror annotates each
//! rendered block with `data-block-id` and `data-crop-url` attributes on a
//! `.block` element — the same attribute convention the ingestion pipeline's
//! HTML mirror uses for every other per-block annotation it carries.

use std::collections::HashMap;

use doc_agent_common::BlockId;
use scraper::{Html, Selector};

/// Parses `html` and returns every `(block_id, crop_url)` pair found on a
/// `.block[data-block-id][data-crop-url]` element. Elements whose
/// `data-block-id` fails canonical validation are skipped.
#[must_use]
pub fn extract_crop_map(html: &str) -> HashMap<BlockId, String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(".block[data-block-id]") else {
        return HashMap::new();
    };

    let mut map = HashMap::new();
    for element in document.select(&selector) {
        let Some(raw_id) = element.value().attr("data-block-id") else {
            continue;
        };
        let Some(id) = BlockId::parse(raw_id) else {
            continue;
        };
        if let Some(crop_url) = element.value().attr("data-crop-url") {
            map.insert(id, crop_url.to_string());
        }
    }
    map
}

/// Extracts plain-text content per block from the HTML OCR mirror, used as
/// fallback content when the Markdown stream is absent for a document
/// (spec §4.1 step 1).
#[must_use]
pub fn extract_text_by_block(html: &str) -> HashMap<BlockId, String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(".block[data-block-id]") else {
        return HashMap::new();
    };

    let mut map = HashMap::new();
    for element in document.select(&selector) {
        let Some(raw_id) = element.value().attr("data-block-id") else {
            continue;
        };
        let Some(id) = BlockId::parse(raw_id) else {
            continue;
        };
        let text: String = element.text().collect::<Vec<_>>().join(" ").trim().to_string();
        map.insert(id, text);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
        <html><body>
            <div class="block" data-block-id="AAAA-BBBB-001" data-crop-url="https://example/crop1.pdf">
                Hello world
            </div>
            <div class="block" data-block-id="not-valid" data-crop-url="https://example/crop2.pdf">
                Skipped
            </div>
            <div class="block" data-block-id="AAAA-BBBB-002">
                No crop url here
            </div>
        </body></html>
    "#;

    #[test]
    fn extracts_only_valid_block_ids_with_crop_urls() {
        let map = extract_crop_map(SAMPLE_HTML);
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get(&BlockId::parse("AAAA-BBBB-001").unwrap()).unwrap(),
            "https://example/crop1.pdf"
        );
    }

    #[test]
    fn extracts_text_content_per_block() {
        let map = extract_text_by_block(SAMPLE_HTML);
        assert!(map
            .get(&BlockId::parse("AAAA-BBBB-001").unwrap())
            .unwrap()
            .contains("Hello world"));
        assert!(map.get(&BlockId::parse("AAAA-BBBB-002").unwrap()).is_some());
    }
}
