//! Per-call diagnostic context.
//!
//! Every dispatched call gets its own [`CallContext`] carrying a unique
//! `trace_id`, the API/service/operation labels, the resolved endpoint, and
//! timing. Diagnostics read from the context of the call they describe, so
//! concurrent calls never see each other's endpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};

use crate::routing::Operation;

/// Generate a unique trace ID for a call.
pub fn generate_trace_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter disambiguates calls within the same nanosecond.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("call-{ts:x}-{count:04x}")
}

/// Diagnostic state owned by one call.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub trace_id: String,
    pub api: String,
    pub service: String,
    pub operation: Operation,
    /// Request body type or caller-supplied name.
    pub request_name: Option<String>,
    /// Resolved URL, once routing has run.
    pub endpoint: Option<String>,
    /// Physical attempts used, once transport has finished.
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl CallContext {
    pub fn new(
        api: impl Into<String>,
        service: impl Into<String>,
        operation: Operation,
        request_name: Option<String>,
    ) -> Self {
        Self {
            trace_id: generate_trace_id(),
            api: api.into(),
            service: service.into(),
            operation,
            request_name,
            endpoint: None,
            attempts: 0,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Short label, e.g. `"OpenAI threads.create"`.
    pub fn label(&self) -> String {
        format!("{} {}.{}", self.api, self.service, self.operation)
    }

    pub fn endpoint_or_unknown(&self) -> &str {
        self.endpoint.as_deref().unwrap_or("(unresolved)")
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} -> {} ({} attempt(s), {:.2}s)",
            self.trace_id,
            self.label(),
            self.endpoint_or_unknown(),
            self.attempts,
            self.elapsed().as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_are_unique() {
        let a = generate_trace_id();
        let b = generate_trace_id();
        assert_ne!(a, b);
        assert!(a.starts_with("call-"));
    }

    #[test]
    fn label_and_summary() {
        let mut ctx = CallContext::new("OpenAI", "threads", Operation::Create, None);
        assert_eq!(ctx.label(), "OpenAI threads.create");
        assert_eq!(ctx.endpoint_or_unknown(), "(unresolved)");

        ctx.endpoint = Some("https://api/threads".into());
        ctx.attempts = 2;
        let summary = ctx.summary();
        assert!(summary.contains("https://api/threads"));
        assert!(summary.contains("2 attempt(s)"));
        assert!(summary.starts_with(&format!("[{}]", ctx.trace_id)));
    }

    #[test]
    fn contexts_are_independent() {
        let mut a = CallContext::new("X", "s", Operation::Get, None);
        let b = CallContext::new("X", "s", Operation::Get, None);
        a.endpoint = Some("https://a".into());
        assert!(b.endpoint.is_none());
        assert_ne!(a.trace_id, b.trace_id);
    }
}
