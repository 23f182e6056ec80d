//! The per-call [`Request`] value and the HTTP [`Verb`] set.
//!
//! A request is owned by the caller. The dispatcher only augments it:
//! auth/beta/static headers go into a separate injected slot and the
//! endpoint is assigned exactly once right before transport.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::RequestDefaults;
use crate::error::{ClientError, ClientResult};

/// The HTTP verbs the dispatcher issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header-name fragments whose values are credentials.
const SENSITIVE_HEADER_PARTS: [&str; 4] = ["authorization", "key", "token", "secret"];

/// A single header name/value pair.
///
/// `Debug` redacts the value of credential headers (`Authorization`,
/// `x-api-key`, ...), so requests can be logged with `{:?}`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Whether the value is a credential.
    pub fn is_sensitive(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        SENSITIVE_HEADER_PARTS.iter().any(|part| name.contains(part))
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.is_sensitive() {
            "<redacted>"
        } else {
            self.value.as_str()
        };
        f.debug_struct("Header")
            .field("name", &self.name)
            .field("value", &value)
            .finish()
    }
}

/// Body encoding of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    /// `application/json`; the content-type header is sent when a body is present.
    #[default]
    Json,
    /// No content-type header.
    None,
}

/// Per-call request state.
#[derive(Debug, Clone, Default)]
pub struct Request {
    endpoint: Option<String>,
    route_override: Option<String>,
    name: Option<String>,
    body: Option<serde_json::Value>,
    content_type: ContentType,
    injected_headers: Vec<Header>,
    headers: Vec<Header>,
    retry_count: Option<u32>,
    retry_delay: Option<Duration>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    log: bool,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request carrying `body` serialized as JSON.
    ///
    /// # Errors
    ///
    /// [`ClientError::ContractViolation`] if the body cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(body: &T) -> ClientResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::contract(format!("request body is not serializable: {e}")))?;
        Ok(Self::new()
            .with_body(value)
            .named(std::any::type_name::<T>()))
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a per-call header. Per-call headers are sent after every injected one.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Use `template` instead of the route table entry for this call.
    pub fn with_route_override(mut self, template: impl Into<String>) -> Self {
        self.route_override = Some(template.into());
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Maximum physical attempts for this call.
    pub fn with_retries(mut self, attempts: u32) -> Self {
        self.retry_count = Some(attempts);
        self
    }

    /// Initial backoff delay. Values under two seconds are raised to two seconds.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Tie the call to an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Log request and response bodies at debug level.
    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    /// Diagnostic name for the request (defaults to the body type name).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    // ── Accessors ──

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn route_override(&self) -> Option<&str> {
        self.route_override.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.unwrap_or(crate::config::DEFAULT_RETRY_COUNT)
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay.unwrap_or(crate::config::DEFAULT_RETRY_DELAY)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(crate::config::DEFAULT_TIMEOUT)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn logging(&self) -> bool {
        self.log
    }

    /// The full header list in wire order: content type, injected headers
    /// (auth, beta, static), then per-call headers.
    pub fn header_list(&self) -> Vec<Header> {
        let mut headers = Vec::with_capacity(1 + self.injected_headers.len() + self.headers.len());
        if self.body.is_some() && self.content_type == ContentType::Json {
            headers.push(Header::new("Content-Type", "application/json"));
        }
        headers.extend(self.injected_headers.iter().cloned());
        headers.extend(self.headers.iter().cloned());
        headers
    }

    /// Serialized body bytes, if any.
    pub(crate) fn body_bytes(&self) -> ClientResult<Option<Vec<u8>>> {
        self.body
            .as_ref()
            .map(|b| {
                serde_json::to_vec(b).map_err(|e| {
                    ClientError::contract(format!("request body is not serializable: {e}"))
                })
            })
            .transpose()
    }

    // ── Mutation by the dispatcher ──

    /// Fill unset retry/timeout values from client defaults.
    pub(crate) fn apply_defaults(&mut self, defaults: &RequestDefaults) {
        self.retry_count.get_or_insert(defaults.retry_count);
        self.retry_delay
            .get_or_insert(Duration::from_millis(defaults.retry_delay_ms));
        self.timeout
            .get_or_insert(Duration::from_secs(defaults.timeout_secs));
    }

    pub(crate) fn inject_header(&mut self, header: Header) {
        self.injected_headers.push(header);
    }

    /// Assign the resolved endpoint. A request is dispatched at most once.
    pub(crate) fn set_endpoint(&mut self, url: String) -> ClientResult<()> {
        if let Some(existing) = &self.endpoint {
            return Err(ClientError::contract(format!(
                "request endpoint already set to {existing}; requests cannot be reused"
            )));
        }
        self.endpoint = Some(url);
        Ok(())
    }
}
