//! JSON extraction from model output.
//!
//! Structured output rarely arrives clean: models wrap JSON in prose, fence
//! it in code blocks, or both. Extraction is a chain of explicit decoders
//! ordered by specificity; the first success wins:
//!
//! 1. direct parse of the whole text
//! 2. balanced-brace scan for the first complete object or array
//! 3. fenced code-block extraction (```json … ``` or bare fences)

use serde_json::Value;

use trellis_domain::error::{Error, Result};

/// Try the full decoder chain on `text`.
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(candidate) = balanced_slice(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Ok(value);
        }
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block.trim()) {
            return Ok(value);
        }
        // Fenced content may itself carry leading prose.
        if let Some(candidate) = balanced_slice(block) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Ok(value);
            }
        }
    }

    Err(Error::Validation(format!(
        "no JSON found in model output ({} chars)",
        text.len()
    )))
}

/// Find the first balanced `{…}` or `[…]` slice, respecting strings and
/// escapes. Returns `None` when no opener exists or the text ends before
/// the structure closes.
fn balanced_slice(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Content of the first fenced code block, tolerating a language tag on
/// the opening fence.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the info string (e.g. "json") up to end of line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_parse_wins() {
        let value = extract_json(r#"{"decision":"direct","confidence":0.9}"#).unwrap();
        assert_eq!(value["decision"], "direct");
    }

    #[test]
    fn direct_parse_of_array() {
        let value = extract_json(r#"[{"type":"respond","purpose":"p"}]"#).unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn brace_scan_skips_leading_prose() {
        let value =
            extract_json(r#"Sure! Here is the plan: {"steps":[{"type":"respond"}]} Done."#)
                .unwrap();
        assert!(value["steps"].is_array());
    }

    #[test]
    fn brace_scan_respects_strings_with_braces() {
        let value = extract_json(r#"answer: {"text":"use {braces} carefully"}"#).unwrap();
        assert_eq!(value["text"], "use {braces} carefully");
    }

    #[test]
    fn brace_scan_respects_escaped_quotes() {
        let value = extract_json(r#"{"text":"she said \"hi\""}"#).unwrap();
        assert_eq!(value["text"], "she said \"hi\"");
    }

    #[test]
    fn fenced_block_extraction() {
        let text = "Here you go:\n```json\n{\"sufficient\": true}\n```\nanything else?";
        let value = extract_json(text).unwrap();
        assert_eq!(value["sufficient"], true);
    }

    #[test]
    fn fenced_block_without_language_tag() {
        let text = "```\n{\"a\":1}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn unbalanced_text_fails() {
        assert!(extract_json("this has a { but never closes").is_err());
    }

    #[test]
    fn plain_prose_fails() {
        assert!(extract_json("I could not produce a plan, sorry.").is_err());
    }

    #[test]
    fn specificity_order_prefers_whole_text() {
        // The whole text is valid JSON even though it contains a fence-like
        // string; the direct parse must win.
        let text = r#"{"note":"```json not a fence```"}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["note"], "```json not a fence```");
    }
}
