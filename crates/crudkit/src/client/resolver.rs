//! Typed response resolution.
//!
//! A successful response body is classified once into a [`RawOutcome`],
//! then [`resolve`] turns the outcome into `Option<T>`, logging everything
//! that is not a typed value. Resolution is a total match: no body shape
//! escapes as an error.

use std::any::type_name;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use super::provider_error::ErrorParser;
use crate::api::CallContext;
use crate::error::ClientError;

/// Classification of a response body against the requested type.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutcome<T> {
    /// The body deserialized into `T`.
    Typed(T),
    /// The body is a provider error object.
    ProviderError { message: String, payload: Value },
    /// Empty body or JSON `null`.
    Empty,
    /// The body is not a `T`.
    Mismatch { returned: String, reason: String },
}

impl<T: DeserializeOwned> RawOutcome<T> {
    /// Classify a raw body. `parser` humanizes provider error payloads for
    /// the named `api`.
    pub fn from_body(body: &[u8], parser: &dyn ErrorParser, api: &str) -> Self {
        if body.iter().all(u8::is_ascii_whitespace) {
            return RawOutcome::Empty;
        }
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                return RawOutcome::Mismatch {
                    returned: format!("non-JSON body ({} bytes)", body.len()),
                    reason: e.to_string(),
                };
            }
        };
        Self::from_value(value, parser, api)
    }

    pub fn from_value(value: Value, parser: &dyn ErrorParser, api: &str) -> Self {
        if value.is_null() {
            return RawOutcome::Empty;
        }
        if is_error_envelope(&value) {
            let message = parser
                .parse(api, &value)
                .unwrap_or_else(|| format!("{api}: {}", value["error"]));
            return RawOutcome::ProviderError {
                message,
                payload: value,
            };
        }
        let returned = describe_shape(&value);
        match serde_json::from_value::<T>(value) {
            Ok(typed) => RawOutcome::Typed(typed),
            Err(e) => RawOutcome::Mismatch {
                returned,
                reason: e.to_string(),
            },
        }
    }
}

/// An object whose only payload is a non-null `error` (plus an optional
/// `type` tag). Bodies that merely contain an `error` field alongside data
/// are left for the typed parse.
fn is_error_envelope(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    object.get("error").is_some_and(|e| !e.is_null())
        && object.keys().all(|k| k == "error" || k == "type")
}

fn describe_shape(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "boolean".into(),
        Value::Number(_) => "number".into(),
        Value::String(_) => "string".into(),
        Value::Array(items) => format!("array of {} item(s)", items.len()),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).take(8).collect();
            let more = if map.len() > keys.len() { ", ..." } else { "" };
            format!("object {{{}{more}}}", keys.join(", "))
        }
    }
}

/// The [`ClientError::Deserialization`] describing a [`RawOutcome::Mismatch`]:
/// requested type, returned shape, endpoint, and serde's reason.
pub fn mismatch_error<T>(ctx: &CallContext, returned: &str, reason: &str) -> ClientError {
    ClientError::Deserialization {
        type_name: type_name::<T>().to_string(),
        reason: format!(
            "the API returned {returned} from {}: {reason}",
            ctx.endpoint_or_unknown()
        ),
    }
}

/// The diagnostic logged for a [`RawOutcome::Mismatch`].
pub fn mismatch_diagnostic<T>(ctx: &CallContext, returned: &str, reason: &str) -> String {
    format!(
        "[{}] {}: {}",
        ctx.trace_id,
        ctx.label(),
        mismatch_error::<T>(ctx, returned, reason)
    )
}

/// Resolve an outcome to a typed value, logging every other case.
pub fn resolve<T>(ctx: &CallContext, outcome: RawOutcome<T>) -> Option<T> {
    match outcome {
        RawOutcome::Typed(value) => Some(value),
        RawOutcome::ProviderError { message, .. } => {
            error!("[{}] {}: {message}", ctx.trace_id, ctx.label());
            None
        }
        RawOutcome::Empty => {
            debug!("[{}] {}: empty response", ctx.trace_id, ctx.label());
            None
        }
        RawOutcome::Mismatch { returned, reason } => {
            error!("{}", mismatch_diagnostic::<T>(ctx, &returned, &reason));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::provider_error::DefaultErrorParser;
    use crate::routing::Operation;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, Debug, PartialEq, Clone)]
    struct Thread {
        id: String,
    }

    fn classify(body: &str) -> RawOutcome<Thread> {
        RawOutcome::from_body(body.as_bytes(), &DefaultErrorParser, "Test")
    }

    fn ctx() -> CallContext {
        let mut ctx = CallContext::new("Test", "threads", Operation::Get, None);
        ctx.endpoint = Some("https://host/threads/t1".into());
        ctx
    }

    #[test]
    fn typed_resolves_to_itself() {
        let thread = Thread { id: "t1".into() };
        assert_eq!(resolve(&ctx(), RawOutcome::Typed(thread.clone())), Some(thread));
        assert_eq!(
            classify(r#"{"id": "t1", "object": "thread"}"#),
            RawOutcome::Typed(Thread { id: "t1".into() })
        );
    }

    #[test]
    fn empty_bodies() {
        assert_eq!(classify(""), RawOutcome::Empty);
        assert_eq!(classify("  \n"), RawOutcome::Empty);
        assert_eq!(classify("null"), RawOutcome::Empty);
        assert_eq!(resolve(&ctx(), classify("")), None);
    }

    #[test]
    fn provider_error_is_humanized() {
        match classify(r#"{"error": {"message": "No such thread", "type": "not_found"}}"#) {
            RawOutcome::ProviderError { message, payload } => {
                assert_eq!(message, "Test: No such thread (not_found)");
                assert!(payload.get("error").is_some());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn error_field_alongside_data_is_not_an_envelope() {
        assert!(!is_error_envelope(&json!({"id": "t1", "error": "partial"})));
        assert!(!is_error_envelope(&json!({"error": null})));
        assert!(is_error_envelope(&json!({"type": "error", "error": {"message": "x"}})));
    }

    #[test]
    fn mismatch_names_type_shape_endpoint_and_reason() {
        let RawOutcome::Mismatch { returned, reason } = classify(r#"{"name": "x"}"#) else {
            panic!("expected mismatch");
        };
        assert_eq!(returned, "object {name}");
        let diagnostic = mismatch_diagnostic::<Thread>(&ctx(), &returned, &reason);
        assert!(diagnostic.contains("Thread"));
        assert!(diagnostic.contains("object {name}"));
        assert!(diagnostic.contains("https://host/threads/t1"));
        assert!(diagnostic.contains("missing field `id`"));

        let err = mismatch_error::<Thread>(&ctx(), &returned, &reason);
        assert_eq!(err.kind(), crate::error::ErrorKind::Deserialization);
        assert!(err.to_string().starts_with("failed to deserialize "));
    }

    #[test]
    fn non_json_body_is_mismatch() {
        let outcome = classify("<html>oops</html>");
        assert!(matches!(outcome, RawOutcome::Mismatch { ref returned, .. } if returned.starts_with("non-JSON")));
        assert_eq!(resolve(&ctx(), outcome), None);
    }

    #[test]
    fn shapes() {
        assert_eq!(describe_shape(&json!([1, 2])), "array of 2 item(s)");
        assert_eq!(describe_shape(&json!("s")), "string");
        assert_eq!(describe_shape(&json!(true)), "boolean");
    }
}
