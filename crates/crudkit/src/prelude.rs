//! Convenience re-exports for SDK code.
//!
//! ```
//! use crudkit::prelude::*;
//! ```
//!
//! Covers building a client, describing routes, dispatching, and streaming.
//! Transport internals and the SSE engine pieces are left out; import
//! those from [`api`](crate::api) when needed.

// ── Client ──────────────────────────────────────────────────────────
pub use crate::client::{
    ClientEvent, ClientFault, CompositeEventHandler, CrudClient, DeleteResponse, DeletionStatus,
    ErrorParser, EventHandler, FaultHandler, FnEventHandler, FnFaultHandler, ListResponse,
    LoggingHandler, NoopHandler, SafeClient,
};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{AuthMode, BetaMode, ClientConfiguration, RequestDefaults, VersionMode};

// ── Requests and routes ─────────────────────────────────────────────
pub use crate::request::{ContentType, Header, Request};
pub use crate::routing::{Operation, PathParam, RouteTable};

// ── Streaming ───────────────────────────────────────────────────────
pub use crate::api::{StreamChunk, StreamEvent, StreamState};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{ClientError, ClientResult, ErrorKind};
