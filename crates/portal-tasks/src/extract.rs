//! Pulling structured sections out of free-form model replies.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

const THINKING_END: &str = "</thinking>";

fn fence_open() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```\w*").ok()).as_ref()
}

/// Text between the first `<tag>` and the following `</tag>`.
pub fn parse_tag_result<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let len = text[start..].find(&close)?;
    Some(&text[start..start + len])
}

/// Body of the first fenced code block. Unfenced text is returned as is, an
/// unterminated fence runs to the end.
pub fn read_code_part(text: &str) -> &str {
    let Some(open) = fence_open().and_then(|re| re.find(text)) else {
        return text;
    };
    let rest = &text[open.end()..];
    match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    }
}

/// The reply from the closing thinking marker on, or the whole reply when it
/// has no thinking block.
pub fn after_thinking(text: &str) -> &str {
    text.find(THINKING_END).map_or(text, |pos| &text[pos..])
}

/// Parse JSON, tolerating a surrounding code fence.
pub fn parse_json_result<T: DeserializeOwned>(text: &str) -> Option<T> {
    let body = read_code_part(text).trim();
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(error) => {
            log::debug!("Reply is not valid JSON: {}", error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn tag_result_finds_first_section() {
        let text = "<DOCUMENT_TITLE>Plan</DOCUMENT_TITLE>\n<DOCUMENT># Plan\nbody</DOCUMENT>";
        assert_eq!(parse_tag_result(text, "DOCUMENT"), Some("# Plan\nbody"));
        assert_eq!(parse_tag_result(text, "DOCUMENT_TITLE"), Some("Plan"));
        assert_eq!(parse_tag_result(text, "SHEET"), None);
    }

    #[test]
    fn tag_result_requires_closing_tag() {
        assert_eq!(parse_tag_result("<SHEET>a,b", "SHEET"), None);
    }

    #[test]
    fn code_part_strips_fence() {
        assert_eq!(read_code_part("Sure:\n```json\n[1]\n```\nDone"), "\n[1]\n");
        assert_eq!(read_code_part("```\nopen"), "\nopen");
        assert_eq!(read_code_part("plain"), "plain");
    }

    #[test]
    fn after_thinking_skips_reasoning() {
        let text = "<thinking><DOCUMENT>draft</DOCUMENT>\n</thinking>\n<DOCUMENT>final</DOCUMENT>";
        assert_eq!(parse_tag_result(after_thinking(text), "DOCUMENT"), Some("final"));
        assert_eq!(after_thinking("no reasoning"), "no reasoning");
    }

    #[test]
    fn json_result_tolerates_fences() {
        let value: Value = parse_json_result("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert!(parse_json_result::<Value>("not json").is_none());
    }
}
