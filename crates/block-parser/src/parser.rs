//! Markdown block stream parser (spec §4.2).

use std::sync::OnceLock;

use doc_agent_common::{Block, BlockId, BlockKind};
use regex::Regex;

fn page_heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^##\s+.*?(\d+)").unwrap())
}

fn block_header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^###\s+BLOCK\s+\[(\w+)\]:\s*(\S+)").unwrap())
}

fn linked_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"→([A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{3})").unwrap())
}

fn parse_kind(raw: &str) -> Option<BlockKind> {
    match raw.to_ascii_uppercase().as_str() {
        "TEXT" => Some(BlockKind::Text),
        "IMAGE" => Some(BlockKind::Image),
        "TABLE" => Some(BlockKind::Table),
        _ => None,
    }
}

/// Parses a Markdown block stream into a typed block list.
///
/// Walks lines top to bottom: `## <page heading N>` markers update the
/// current page (default 1 until the first heading); `### BLOCK [KIND]: <id>`
/// headers start a new block whose content accumulates until the next
/// header of either kind. Headers with an unparseable kind or an invalid
/// block ID are skipped (their body lines are treated as stray and dropped).
#[must_use]
pub fn parse_block_stream(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current_page: u32 = 1;
    let mut current: Option<(BlockId, BlockKind, u32, Vec<&str>)> = None;

    for line in markdown.lines() {
        if let Some(caps) = page_heading_pattern().captures(line) {
            flush(&mut current, &mut blocks);
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                current_page = n;
            }
            continue;
        }

        if let Some(caps) = block_header_pattern().captures(line) {
            let kind_raw = &caps[1];
            let id_raw = &caps[2];
            flush(&mut current, &mut blocks);
            if let (Some(kind), Some(id)) = (parse_kind(kind_raw), BlockId::parse(id_raw)) {
                current = Some((id, kind, current_page, Vec::new()));
            }
            continue;
        }

        if let Some((_, _, _, content_lines)) = current.as_mut() {
            content_lines.push(line);
        }
    }
    flush(&mut current, &mut blocks);

    blocks
}

fn flush(current: &mut Option<(BlockId, BlockKind, u32, Vec<&str>)>, blocks: &mut Vec<Block>) {
    if let Some((id, kind, page, content_lines)) = current.take() {
        let content = content_lines.join("\n").trim().to_string();
        let linked_ids = linked_id_pattern()
            .captures_iter(&content)
            .filter_map(|c| BlockId::parse(&c[1]))
            .collect();
        blocks.push(Block {
            id,
            kind,
            page,
            content,
            linked_ids,
            crop_url: None,
        });
    }
}

/// Re-serialises a block list back into the same Markdown shape it was
/// parsed from, grouped by page in first-seen order. Used to verify the
/// round-trip property in spec §8 ("parsing Markdown then serialising the
/// block list back yields the same tuples").
#[must_use]
pub fn serialize_block_stream(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut last_page: Option<u32> = None;
    for block in blocks {
        if last_page != Some(block.page) {
            out.push_str(&format!("## Page {}\n", block.page));
            last_page = Some(block.page);
        }
        let kind = match block.kind {
            BlockKind::Text => "TEXT",
            BlockKind::Image => "IMAGE",
            BlockKind::Table => "TABLE",
        };
        out.push_str(&format!("### BLOCK [{}]: {}\n", kind, block.id));
        out.push_str(&block.content);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "## Page 1\n\
### BLOCK [TEXT]: AAAA-BBBB-001\n\
First paragraph content.\n\
See also →AAAA-BBBB-002 for details.\n\
## Page 2\n\
### BLOCK [IMAGE]: AAAA-BBBB-002\n\
A diagram.\n";

    #[test]
    fn parses_pages_kinds_and_links() {
        let blocks = parse_block_stream(SAMPLE);
        assert_eq!(blocks.len(), 2);

        assert_eq!(blocks[0].id.as_str(), "AAAA-BBBB-001");
        assert_eq!(blocks[0].kind, BlockKind::Text);
        assert_eq!(blocks[0].page, 1);
        assert_eq!(blocks[0].linked_ids, vec![BlockId::parse("AAAA-BBBB-002").unwrap()]);
        assert!(blocks[0].content.contains("First paragraph"));

        assert_eq!(blocks[1].id.as_str(), "AAAA-BBBB-002");
        assert_eq!(blocks[1].kind, BlockKind::Image);
        assert_eq!(blocks[1].page, 2);
    }

    #[test]
    fn defaults_page_to_one_when_no_heading_precedes() {
        let md = "### BLOCK [TEXT]: AAAA-BBBB-001\nno page heading above\n";
        let blocks = parse_block_stream(md);
        assert_eq!(blocks[0].page, 1);
    }

    #[test]
    fn skips_header_with_invalid_block_id() {
        let md = "### BLOCK [TEXT]: not-a-valid-id\nstray content\n";
        let blocks = parse_block_stream(md);
        assert!(blocks.is_empty());
    }

    #[test]
    fn round_trip_preserves_id_kind_page_links_and_trimmed_content() {
        let blocks = parse_block_stream(SAMPLE);
        let serialized = serialize_block_stream(&blocks);
        let reparsed = parse_block_stream(&serialized);

        assert_eq!(blocks.len(), reparsed.len());
        for (a, b) in blocks.iter().zip(reparsed.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.page, b.page);
            assert_eq!(a.linked_ids, b.linked_ids);
            assert_eq!(a.content, b.content);
        }
    }
}
