//! The transport primitive: one HTTP call, or one opened byte stream.
//!
//! [`Transport`] is the seam between the dispatcher and the network. The
//! default [`ReqwestTransport`] wraps a shared `reqwest::Client`; tests and
//! embedders can supply their own implementation. Connection pooling is the
//! transport's business, not the dispatcher's.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use tracing::{debug, trace};

use crate::error::{ClientError, ClientResult, TransportError};
use crate::request::{Header, Request, Verb};

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Incremental body flushes of a streaming response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// A fully resolved HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub verb: Verb,
    pub url: String,
    pub headers: Vec<Header>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Snapshot a dispatched [`Request`] for the wire.
    ///
    /// # Errors
    ///
    /// [`ClientError::ContractViolation`] if the endpoint has not been
    /// resolved or the body cannot be serialized.
    pub fn from_request(request: &Request, verb: Verb) -> ClientResult<Self> {
        let url = request
            .endpoint()
            .ok_or_else(|| ClientError::contract("request dispatched before endpoint resolution"))?
            .to_string();
        Ok(Self {
            verb,
            url,
            headers: request.header_list(),
            body: request.body_bytes()?,
            timeout: request.timeout(),
        })
    }
}

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// An opened streaming response.
pub struct StreamResponse {
    pub status: u16,
    pub flushes: ByteStream,
}

/// Sends one request per call.
///
/// `execute` returns any HTTP status as a response; the dispatcher decides
/// what counts as failure. `open_stream` only succeeds for 2xx statuses and
/// reports anything else as [`TransportError::Status`].
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> TransportFuture<'_, HttpResponse>;

    fn open_stream(&self, request: HttpRequest) -> TransportFuture<'_, StreamResponse>;
}

/// Run one attempt and turn a non-2xx status into a [`TransportError`].
pub(crate) async fn execute_checked(
    transport: &dyn Transport,
    request: HttpRequest,
) -> Result<HttpResponse, TransportError> {
    let response = transport.execute(request).await?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(TransportError::Status {
            status: response.status,
            body: response.text().into_owned(),
        })
    }
}

// ── reqwest ────────────────────────────────────────────────────────

/// [`Transport`] backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with a fresh `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new() -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crudkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shares its connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn builder(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let method = match request.verb {
            Verb::Get => reqwest::Method::GET,
            Verb::Post => reqwest::Method::POST,
            Verb::Patch => reqwest::Method::PATCH,
            Verb::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, &request.url);
        for header in &request.headers {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        builder
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> TransportFuture<'_, HttpResponse> {
        Box::pin(async move {
            trace!("{} {}", request.verb, request.url);
            let timeout = request.timeout;
            let resp = self
                .builder(&request)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| classify(e, timeout))?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await.map_err(|e| classify(e, timeout))?;
            debug!("HTTP {status} from {} ({} bytes)", request.url, body.len());
            Ok(HttpResponse::new(status, body.to_vec()))
        })
    }

    fn open_stream(&self, request: HttpRequest) -> TransportFuture<'_, StreamResponse> {
        Box::pin(async move {
            trace!("{} {} (stream)", request.verb, request.url);
            let timeout = request.timeout;
            // Only connection setup is bounded; the body may stream for longer.
            let resp = tokio::time::timeout(timeout, self.builder(&request).send())
                .await
                .map_err(|_| TransportError::Timeout(timeout))?
                .map_err(|e| classify(e, timeout))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let flushes = futures::stream::try_unfold(resp, move |mut resp| async move {
                match resp.chunk().await {
                    Ok(Some(chunk)) => Ok(Some((chunk.to_vec(), resp))),
                    Ok(None) => Ok(None),
                    Err(e) => Err(classify(e, timeout)),
                }
            });
            Ok(StreamResponse {
                status: status.as_u16(),
                flushes: Box::pin(flushes),
            })
        })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else if err.is_body() || err.is_decode() {
        TransportError::DataProcessing(err.to_string())
    } else {
        TransportError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_request_requires_endpoint() {
        let req = Request::new();
        let err = HttpRequest::from_request(&req, Verb::Get).unwrap_err();
        assert!(matches!(err, ClientError::ContractViolation(_)));
    }

    #[test]
    fn from_request_snapshots_headers_and_body() {
        let mut req = Request::new()
            .with_body(json!({"name": "x"}))
            .with_timeout(Duration::from_secs(5));
        req.set_endpoint("https://host/things".into()).unwrap();
        let http = HttpRequest::from_request(&req, Verb::Post).unwrap();
        assert_eq!(http.url, "https://host/things");
        assert_eq!(http.headers[0].name, "Content-Type");
        assert_eq!(http.body.as_deref(), Some(br#"{"name":"x"}"#.as_slice()));
        assert_eq!(http.timeout, Duration::from_secs(5));
    }

    #[test]
    fn debug_hides_the_auth_header() {
        let mut req = Request::new();
        req.inject_header(Header::new("Authorization", "Bearer sk-live"));
        req.set_endpoint("https://host/things".into()).unwrap();
        let http = HttpRequest::from_request(&req, Verb::Get).unwrap();
        assert_eq!(http.headers[0].value, "Bearer sk-live");
        assert!(!format!("{http:?}").contains("sk-live"));
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(301, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }
}
