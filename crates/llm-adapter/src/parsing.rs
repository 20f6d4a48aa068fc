//! Tolerant JSON recovery and partial-JSON token extraction (spec §4.5, §9).

use crate::error::{LlmError, LlmResult};

/// Parses `raw` as JSON, first strictly, then by slicing between the first
/// `{` and the last `}` if strict parsing fails (providers occasionally wrap
/// structured output in prose or code fences).
pub fn parse_tolerant(raw: &str) -> LlmResult<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        return Ok(value);
    }

    let start = raw.find('{');
    let end = raw.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(LlmError::UnparsableResponse(raw.chars().take(200).collect()))
}

/// Extracts the live `answer_markdown` value out of a partial, still-being-
/// streamed JSON document, for token-by-token UI updates before the object
/// is fully formed. Scans for `"answer_markdown":"` and walks characters
/// honoring backslash escapes until an unescaped closing quote (or end of
/// input, for a value still being written).
#[must_use]
pub fn extract_partial_answer_markdown(partial_json: &str) -> Option<String> {
    const NEEDLE: &str = "\"answer_markdown\"";
    let key_pos = partial_json.find(NEEDLE)?;
    let after_key = &partial_json[key_pos + NEEDLE.len()..];
    let colon_pos = after_key.find(':')?;
    let after_colon = after_key[colon_pos + 1..].trim_start();
    let value_start = after_colon.strip_prefix('"')?;

    let mut out = String::new();
    let mut chars = value_start.chars().peekable();
    let mut escaped = false;
    while let Some(ch) = chars.next() {
        if escaped {
            match ch {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                other => out.push(other),
            }
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => return Some(out),
            other => out.push(other),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_parses_directly() {
        let value = parse_tolerant(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn wrapped_json_recovers_via_brace_slice() {
        let raw = "Here is the result:\n```json\n{\"a\": 1}\n```\nThanks!";
        let value = parse_tolerant(raw).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn unparsable_input_is_an_error() {
        assert!(parse_tolerant("not json at all").is_err());
    }

    #[test]
    fn extracts_partial_answer_markdown_mid_stream() {
        let partial = r#"{"answer_markdown":"The document shows a trend"#;
        let extracted = extract_partial_answer_markdown(partial).unwrap();
        assert_eq!(extracted, "The document shows a trend");
    }

    #[test]
    fn extracts_complete_answer_markdown_honoring_escapes() {
        let partial = r#"{"answer_markdown":"Line one\nLine \"two\"","citations":[]}"#;
        let extracted = extract_partial_answer_markdown(partial).unwrap();
        assert_eq!(extracted, "Line one\nLine \"two\"");
    }

    #[test]
    fn returns_none_when_key_absent() {
        assert_eq!(extract_partial_answer_markdown(r#"{"other": 1}"#), None);
    }
}
