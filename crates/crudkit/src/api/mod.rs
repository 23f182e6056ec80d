//! Wire layer: the transport seam, retry/backoff, SSE assembly, and per-call
//! diagnostic context.
//!
//! - [`transport`]: the [`Transport`] trait and the default
//!   [`ReqwestTransport`].
//! - [`retry`]: bounded retries with doubling backoff that race the
//!   request's cancellation token.
//! - [`streaming`]: the [`SseEngine`] turning byte flushes into ordered
//!   [`StreamEvent`]s.
//! - [`context`]: [`CallContext`], the diagnostic state owned by one call.

pub mod context;
pub mod retry;
pub mod streaming;
pub mod transport;

pub use context::{CallContext, generate_trace_id};
pub use retry::{RetryNotice, RetryPolicy, run_with_retry};
pub use streaming::{SseEngine, StreamChunk, StreamEvent, StreamPhase, StreamState};
pub use transport::{
    ByteStream, HttpRequest, HttpResponse, ReqwestTransport, StreamResponse, Transport,
    TransportFuture,
};
