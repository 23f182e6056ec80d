//! Humanizing provider error payloads.
//!
//! Providers embed their error objects in different shapes. An
//! [`ErrorParser`] turns one into a readable message; the default parser
//! knows the common ones.

use serde_json::Value;

/// Turns a provider's error payload into a human-readable message.
pub trait ErrorParser: Send + Sync {
    /// `None` when the payload is not recognized.
    fn parse(&self, api: &str, payload: &Value) -> Option<String>;
}

/// Recognizes the usual shapes:
///
/// - `{"error": {"message": "...", "type"|"code"|"status": ...}}`
/// - `{"error": "..."}`
/// - `{"message": "..."}` and `{"detail": "..."}`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorParser;

impl ErrorParser for DefaultErrorParser {
    fn parse(&self, api: &str, payload: &Value) -> Option<String> {
        let message = match payload.get("error") {
            Some(Value::String(s)) => s.clone(),
            Some(err @ Value::Object(_)) => {
                let text = err.get("message").and_then(Value::as_str)?;
                let label = ["type", "code", "status"]
                    .iter()
                    .find_map(|k| err.get(*k).filter(|v| !v.is_null()))
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                match label {
                    Some(label) => format!("{text} ({label})"),
                    None => text.to_string(),
                }
            }
            _ => payload
                .get("message")
                .or_else(|| payload.get("detail"))
                .and_then(Value::as_str)?
                .to_string(),
        };
        Some(format!("{api}: {message}"))
    }
}

/// Find the JSON object embedded at `marker` in `text` and humanize it.
///
/// An object enclosing the marker wins, so markers such as `"error"` that
/// sit inside the payload still see the whole object. Otherwise the first
/// object after the marker is used. With an empty marker the whole text is
/// searched. Returns `None` when the marker is absent, no object parses, or
/// `parser` does not recognize it.
pub fn extract_embedded_error(
    text: &str,
    marker: &str,
    parser: &dyn ErrorParser,
    api: &str,
) -> Option<String> {
    let start = if marker.is_empty() { 0 } else { text.find(marker)? };
    let head = text.get(..start)?;
    let enclosing = head.match_indices('{').find_map(|(offset, _)| {
        let (value, end) = object_at(text, offset)?;
        if end > start {
            parser.parse(api, &value)
        } else {
            None
        }
    });
    enclosing.or_else(|| {
        let tail = text.get(start..)?;
        tail.match_indices('{').find_map(|(offset, _)| {
            let (value, _) = object_at(tail, offset)?;
            parser.parse(api, &value)
        })
    })
}

/// The JSON object starting at `offset`, with the byte offset just past it.
fn object_at(text: &str, offset: usize) -> Option<(Value, usize)> {
    let candidate = text.get(offset..)?;
    let mut objects = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
    match objects.next() {
        Some(Ok(value @ Value::Object(_))) => Some((value, offset + objects.byte_offset())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_error_object() {
        let msg = DefaultErrorParser.parse(
            "OpenAI",
            &json!({"error": {"message": "Invalid key", "type": "invalid_request_error"}}),
        );
        assert_eq!(
            msg.as_deref(),
            Some("OpenAI: Invalid key (invalid_request_error)")
        );
    }

    #[test]
    fn numeric_code_and_flat_shapes() {
        let p = DefaultErrorParser;
        assert_eq!(
            p.parse("G", &json!({"error": {"message": "quota", "code": 429}}))
                .as_deref(),
            Some("G: quota (429)")
        );
        assert_eq!(
            p.parse("X", &json!({"error": "boom"})).as_deref(),
            Some("X: boom")
        );
        assert_eq!(
            p.parse("X", &json!({"detail": "not found"})).as_deref(),
            Some("X: not found")
        );
        assert_eq!(p.parse("X", &json!({"id": 1})), None);
    }

    #[test]
    fn embedded_after_marker() {
        let text = r#"request failed: HTTP 400: Error Body: {"error": {"message": "bad model"}} trailing"#;
        let msg = extract_embedded_error(text, "Error Body:", &DefaultErrorParser, "API");
        assert_eq!(msg.as_deref(), Some("API: bad model"));
    }

    #[test]
    fn skips_unparseable_braces() {
        let text = r#"marker {oops} then {"message": "real"}"#;
        let msg = extract_embedded_error(text, "marker", &DefaultErrorParser, "API");
        assert_eq!(msg.as_deref(), Some("API: real"));
    }

    #[test]
    fn marker_inside_the_object() {
        let text = r#"HTTP 400: {"error": {"message": "bad model", "type": "invalid_request_error"}}"#;
        let msg = extract_embedded_error(text, "\"error\"", &DefaultErrorParser, "API");
        assert_eq!(msg.as_deref(), Some("API: bad model (invalid_request_error)"));
    }

    #[test]
    fn object_before_the_marker_is_ignored() {
        let text = r#"{"message": "stale"} marker {"message": "fresh"}"#;
        let msg = extract_embedded_error(text, "marker", &DefaultErrorParser, "API");
        assert_eq!(msg.as_deref(), Some("API: fresh"));
    }

    #[test]
    fn absent_marker_or_object() {
        assert_eq!(
            extract_embedded_error("no json here", "marker", &DefaultErrorParser, "A"),
            None
        );
        assert_eq!(
            extract_embedded_error("marker but no object", "marker", &DefaultErrorParser, "A"),
            None
        );
    }
}
