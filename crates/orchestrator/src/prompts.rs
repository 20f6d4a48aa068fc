//! System prompt templates and response schemas for each LLM call the
//! pipeline makes (spec §4.1, §4.5). Kept separate from `pipeline.rs` so the
//! wording can be iterated on without touching control flow.

use serde_json::{json, Value};

pub const INTENT_SYSTEM_PROMPT: &str = "\
You are the intent router for a document analysis assistant. Given a short \
snippet of the user's question, decide whether answering it will require \
looking closely at a rendered image of the document (tables, charts, \
diagrams, scanned handwriting, or layout-sensitive content) rather than the \
extracted text alone. Identify a short topic summary and any page numbers \
the user explicitly mentioned. Respond with exactly one JSON object matching \
the provided schema. Never request visual detail for questions that are \
answerable from plain text.";

#[must_use]
pub fn intent_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "requires_visual_detail": { "type": "boolean" },
            "topic_summary": { "type": "string" },
            "preferred_pages": { "type": "array", "items": { "type": "integer" } }
        },
        "required": ["requires_visual_detail"]
    })
}

pub const FLASH_EXTRACTOR_SYSTEM_PROMPT: &str = "\
You are reviewing one document's block stream to find the material relevant \
to a user's question. Each block carries a twelve-character id in the form \
XXXX-XXXX-XXX; never invent an id that doesn't appear in the stream. Select \
the blocks that support an answer, and for any selected IMAGE block that the \
question needs rendered, list it under requested_images. If a specific \
sub-region of a block's image needs close inspection, list it under \
requested_rois with a normalized bounding box (x1,y1,x2,y2 in [0,1]). \
Respond with exactly one JSON object matching the provided schema.";

#[must_use]
pub fn flash_collector_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "selected_blocks": { "type": "array", "items": { "type": "string" } },
            "requested_images": {
                "type": "array",
                "items": { "type": "object", "properties": { "block_id": { "type": "string" } }, "required": ["block_id"] }
            },
            "requested_rois": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "block_id": { "type": "string" },
                        "bbox": {
                            "type": "object",
                            "properties": {
                                "x1": { "type": "number" }, "y1": { "type": "number" },
                                "x2": { "type": "number" }, "y2": { "type": "number" }
                            },
                            "required": ["x1", "y1", "x2", "y2"]
                        },
                        "dpi": { "type": "integer" }
                    },
                    "required": ["block_id", "bbox"]
                }
            },
            "materials_summary": { "type": "string" }
        },
        "required": ["selected_blocks"]
    })
}

pub const FACTS_EXTRACTOR_SYSTEM_PROMPT: &str = "\
Extract structured facts from the selected document blocks: standalone \
key-value facts (dates, totals, identifiers, named parties) and any tables \
worth preserving verbatim. Cite the source block id for each fact and table \
when it is known. Respond with exactly one JSON object matching the provided \
schema. If nothing qualifies, return empty arrays rather than guessing.";

#[must_use]
pub fn document_facts_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "key_values": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": { "key": { "type": "string" }, "value": { "type": "string" }, "source_block_id": { "type": "string" } },
                    "required": ["key", "value"]
                }
            },
            "tables": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "headers": { "type": "array", "items": { "type": "string" } },
                        "rows": { "type": "array", "items": { "type": "array", "items": { "type": "string" } } },
                        "source_block_id": { "type": "string" }
                    },
                    "required": ["headers", "rows"]
                }
            }
        }
    })
}

pub const ANSWERER_SYSTEM_PROMPT_SIMPLE: &str = "\
You are a document analysis assistant answering a user's question directly \
from the extracted text of the documents they attached. Cite the block id of \
every claim you make. Respond with exactly one JSON object matching the \
provided schema. Set needs_more_evidence and populate followup_images or \
followup_rois only when the text alone is genuinely insufficient.";

pub const ANSWERER_SYSTEM_PROMPT_COMPLEX: &str = "\
You are a document analysis assistant. You have been given a materials \
package: selected document blocks, extracted facts, and any rendered images \
uploaded for your inspection. Answer the user's question using this \
material, citing the block id (and bounding box, when the evidence came from \
a rendered image region) for every claim. Raise issues for anything \
inconsistent or incomplete, and list concrete recommendations when \
appropriate. Respond with exactly one JSON object matching the provided \
schema.";

pub const ANSWERER_SYSTEM_PROMPT_COMPARE: &str = "\
You are comparing two sets of documents, labeled DOC_A and DOC_B in the \
materials package. Answer the user's question with reference to both sides, \
and populate the diff array with every material difference you find: each \
diff item names the field that differs, the value on each side, and \
evidence citing at least one block from each side whenever both sides have a \
value for that field. Respond with exactly one JSON object matching the \
provided schema.";

pub const ROI_REQUESTER_SYSTEM_PROMPT: &str = "\
Your previous answer needed visual detail it didn't have. Looking only at \
the question and your prior answer, name up to three regions of interest \
that, if rendered and inspected, would let you confirm or correct the \
answer. Respond with exactly one JSON object matching the provided schema, \
populating followup_rois and leaving answer_markdown equal to your prior \
answer unchanged.";

#[must_use]
pub fn answer_schema() -> Value {
    let bbox_schema = json!({
        "type": "object",
        "properties": {
            "x1": { "type": "number" }, "y1": { "type": "number" },
            "x2": { "type": "number" }, "y2": { "type": "number" }
        },
        "required": ["x1", "y1", "x2", "y2"]
    });
    let citation_schema = json!({
        "type": "object",
        "properties": {
            "block_id": { "type": "string" },
            "page": { "type": "integer" },
            "bbox": bbox_schema.clone()
        },
        "required": ["block_id"]
    });

    json!({
        "type": "object",
        "properties": {
            "answer_markdown": { "type": "string" },
            "citations": { "type": "array", "items": citation_schema.clone() },
            "issues": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "severity": { "type": "string", "enum": ["info", "warning", "critical"] },
                        "description": { "type": "string" },
                        "evidence": { "type": "array", "items": citation_schema.clone() }
                    },
                    "required": ["severity", "description"]
                }
            },
            "recommendations": { "type": "array", "items": { "type": "string" } },
            "diff": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "field": { "type": "string" },
                        "before": { "type": "string" },
                        "after": { "type": "string" },
                        "evidence": { "type": "array", "items": citation_schema.clone() }
                    },
                    "required": ["field", "before", "after"]
                }
            },
            "needs_more_evidence": { "type": "boolean" },
            "followup_images": { "type": "array", "items": { "type": "string" } },
            "followup_rois": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": { "block_id": { "type": "string" }, "bbox": bbox_schema.clone(), "dpi": { "type": "integer" } },
                    "required": ["block_id", "bbox"]
                }
            }
        },
        "required": ["answer_markdown"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_are_well_formed_objects() {
        for schema in [intent_schema(), flash_collector_schema(), document_facts_schema(), answer_schema()] {
            assert_eq!(schema.get("type").and_then(Value::as_str), Some("object"));
        }
    }
}
