//! Extracting a JSON object from an LLM reply.
//!
//! Models answer with clean JSON, JSON inside a markdown code fence, or
//! JSON wrapped in prose — sometimes all three across retries. The
//! extractor tries, in order: a fenced block, the first balanced
//! `{...}` span, and the whole trimmed reply.

/// Pull the most plausible JSON object out of a model reply.
///
/// Returns `None` when nothing in the text parses as a JSON object.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    // Attempt 1: fenced code block (```json ... ``` or bare ```).
    if let Some(inner) = fenced_block(text) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(inner.trim()) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    // Attempt 2: first balanced brace span.
    if let Some(span) = balanced_braces(text) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(span) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    // Attempt 3: the whole reply.
    serde_json::from_str::<serde_json::Value>(text.trim())
        .ok()
        .filter(|v| v.is_object())
}

/// The contents of the first markdown code fence, language tag stripped.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip an optional language tag up to the first newline.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// The first `{ ... }` span with balanced braces.
///
/// Brace counting ignores string contents so paths like `"{a}"` inside
/// values do not derail the scan.
fn balanced_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_json() {
        let value = extract_json_object(r#"{"steps": []}"#).unwrap();
        assert_eq!(value, json!({"steps": []}));
    }

    #[test]
    fn fenced_json() {
        let text = "Here is the plan:\n```json\n{\"steps\": [{\"id\": 1}]}\n```\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["steps"][0]["id"], 1);
    }

    #[test]
    fn fence_without_language_tag() {
        let text = "```\n{\"ok\": true}\n```";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn prose_wrapped_json() {
        let text = "Sure! The corrected arguments are {\"arguments\": {\"path\": \"/\"}} — let me know.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["arguments"]["path"], "/");
    }

    #[test]
    fn nested_objects_matched_fully() {
        let text = "x {\"a\": {\"b\": {\"c\": 1}}, \"d\": 2} y";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["a"]["b"]["c"], 1);
        assert_eq!(value["d"], 2);
    }

    #[test]
    fn braces_inside_strings_ignored() {
        let text = r#"{"path": "/tmp/{session}/out", "n": 1}"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["path"], "/tmp/{session}/out");
    }

    #[test]
    fn no_json_returns_none() {
        assert!(extract_json_object("I could not produce a plan.").is_none());
        assert!(extract_json_object("").is_none());
    }

    #[test]
    fn array_is_not_an_object() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }

    #[test]
    fn broken_fence_falls_back_to_braces() {
        let text = "```json\n{\"ok\": 1}";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["ok"], 1);
    }
}
