//! Coverage check: closes the link graph and augments the selected block set
//! with additional query-relevant blocks (spec §4.1 step 3, §4.2).

use std::collections::HashSet;

use doc_agent_common::{Block, BlockId, BlockKind, ImageRequest};

/// Tuning knobs for [`augment_selection`], broken out so tests and callers
/// don't have to thread five bare numbers through the call site.
#[derive(Debug, Clone, Copy)]
pub struct CoverageParams {
    pub score_threshold: f64,
    pub max_additional_blocks: usize,
    pub preferred_page_bonus: f64,
    pub short_content_penalty: f64,
    pub short_content_len: usize,
}

impl Default for CoverageParams {
    fn default() -> Self {
        Self {
            score_threshold: 2.0,
            max_additional_blocks: 10,
            preferred_page_bonus: 1.5,
            short_content_penalty: -0.5,
            short_content_len: 20,
        }
    }
}

/// Result of [`augment_selection`]: the closed-and-augmented block ID set,
/// plus any newly synthesised image requests for IMAGE blocks pulled in by
/// the augmentation.
#[derive(Debug, Default)]
pub struct CoverageResult {
    pub selected: Vec<BlockId>,
    pub new_image_requests: Vec<ImageRequest>,
}

/// Tokenises a query into lowercased word tokens of length ≥ 2.
fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_lowercase)
        .collect()
}

fn score_block(block: &Block, terms: &[String], preferred_pages: &[u32], params: &CoverageParams) -> f64 {
    let lower = block.content.to_lowercase();
    let mut score = terms.iter().filter(|t| lower.contains(t.as_str())).count() as f64;
    if preferred_pages.contains(&block.page) {
        score += params.preferred_page_bonus;
    }
    if block.content.len() < params.short_content_len {
        score += params.short_content_penalty;
    }
    score
}

/// Closes `selected` under link references in both directions: a selected
/// block pulls in everything it links to, and anything that links to a
/// selected block is pulled in too.
fn close_link_graph(blocks: &[Block], selected: &mut HashSet<BlockId>) {
    loop {
        let mut grew = false;
        for block in blocks {
            if selected.contains(&block.id) {
                for linked in &block.linked_ids {
                    if selected.insert(linked.clone()) {
                        grew = true;
                    }
                }
            } else if block.linked_ids.iter().any(|l| selected.contains(l))
                && selected.insert(block.id.clone())
            {
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
}

/// Runs the full coverage check described in spec §4.1 step 3 / §4.2:
/// closes the link graph, scores and adds top-scoring remaining blocks, and
/// synthesises image requests for any newly included IMAGE block not
/// already present in `existing_image_requests`.
#[must_use]
pub fn augment_selection(
    blocks: &[Block],
    initially_selected: &[BlockId],
    query: &str,
    preferred_pages: &[u32],
    existing_image_requests: &[ImageRequest],
    params: &CoverageParams,
) -> CoverageResult {
    let mut selected: HashSet<BlockId> = initially_selected.iter().cloned().collect();
    close_link_graph(blocks, &mut selected);

    let terms = query_terms(query);
    let mut scored: Vec<(f64, &Block)> = blocks
        .iter()
        .filter(|b| !selected.contains(&b.id) && matches!(b.kind, BlockKind::Text | BlockKind::Table))
        .map(|b| (score_block(b, &terms, preferred_pages, params), b))
        .filter(|(score, _)| *score >= params.score_threshold)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(params.max_additional_blocks);

    for (_, block) in scored {
        selected.insert(block.id.clone());
    }

    // Re-close the link graph: newly added scored blocks may link to others.
    close_link_graph(blocks, &mut selected);

    let already_requested: HashSet<&BlockId> =
        existing_image_requests.iter().map(|r| &r.block_id).collect();
    let mut new_image_requests = Vec::new();
    for block in blocks {
        if block.is_image() && selected.contains(&block.id) && !already_requested.contains(&block.id) {
            new_image_requests.push(ImageRequest {
                block_id: block.id.clone(),
            });
        }
    }

    CoverageResult {
        selected: selected.into_iter().collect(),
        new_image_requests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_agent_common::BlockId;

    fn block(id: &str, kind: BlockKind, page: u32, content: &str, links: &[&str]) -> Block {
        Block {
            id: BlockId::parse(id).unwrap(),
            kind,
            page,
            content: content.to_string(),
            linked_ids: links.iter().map(|l| BlockId::parse(l).unwrap()).collect(),
            crop_url: None,
        }
    }

    #[test]
    fn closes_link_graph_both_directions() {
        let blocks = vec![
            block("AAAA-0000-001", BlockKind::Text, 1, "alpha content here", &["AAAA-0000-002"]),
            block("AAAA-0000-002", BlockKind::Text, 1, "beta content here", &[]),
            block("AAAA-0000-003", BlockKind::Text, 1, "gamma links back →AAAA-0000-001", &["AAAA-0000-001"]),
        ];
        let result = augment_selection(
            &blocks,
            &[BlockId::parse("AAAA-0000-001").unwrap()],
            "unrelated query",
            &[],
            &[],
            &CoverageParams::default(),
        );
        let ids: HashSet<_> = result.selected.into_iter().collect();
        assert!(ids.contains(&BlockId::parse("AAAA-0000-002").unwrap()));
        assert!(ids.contains(&BlockId::parse("AAAA-0000-003").unwrap()));
    }

    #[test]
    fn scores_and_adds_top_matching_blocks_above_threshold() {
        let blocks = vec![
            block("AAAA-0000-001", BlockKind::Text, 1, "seed block", &[]),
            block(
                "AAAA-0000-002",
                BlockKind::Text,
                5,
                "this block mentions total cost and total revenue values",
                &[],
            ),
            block("AAAA-0000-003", BlockKind::Text, 1, "irrelevant filler text about weather", &[]),
        ];
        let result = augment_selection(
            &blocks,
            &[BlockId::parse("AAAA-0000-001").unwrap()],
            "total revenue",
            &[5],
            &[],
            &CoverageParams::default(),
        );
        let ids: HashSet<_> = result.selected.into_iter().collect();
        assert!(ids.contains(&BlockId::parse("AAAA-0000-002").unwrap()));
        assert!(!ids.contains(&BlockId::parse("AAAA-0000-003").unwrap()));
    }

    #[test]
    fn synthesises_image_request_for_newly_included_image_block() {
        let blocks = vec![
            block("AAAA-0000-001", BlockKind::Text, 1, "see the diagram →AAAA-0000-002", &["AAAA-0000-002"]),
            block("AAAA-0000-002", BlockKind::Image, 1, "diagram", &[]),
        ];
        let result = augment_selection(
            &blocks,
            &[BlockId::parse("AAAA-0000-001").unwrap()],
            "diagram",
            &[],
            &[],
            &CoverageParams::default(),
        );
        assert_eq!(result.new_image_requests.len(), 1);
        assert_eq!(result.new_image_requests[0].block_id.as_str(), "AAAA-0000-002");
    }

    #[test]
    fn does_not_duplicate_existing_image_requests() {
        let blocks = vec![
            block("AAAA-0000-001", BlockKind::Text, 1, "link →AAAA-0000-002", &["AAAA-0000-002"]),
            block("AAAA-0000-002", BlockKind::Image, 1, "diagram", &[]),
        ];
        let existing = vec![ImageRequest {
            block_id: BlockId::parse("AAAA-0000-002").unwrap(),
        }];
        let result = augment_selection(
            &blocks,
            &[BlockId::parse("AAAA-0000-001").unwrap()],
            "diagram",
            &[],
            &existing,
            &CoverageParams::default(),
        );
        assert!(result.new_image_requests.is_empty());
    }
}
