//! Generic CRUD-over-REST client engine for building typed provider SDKs.
//!
//! `crudkit` is the shared core behind thin per-provider SDKs. A provider
//! contributes a [`ClientConfiguration`] (base URL, auth, version and beta
//! conventions) and one [`RouteTable`] per service; the engine does the
//! rest:
//!
//! - route construction from templates with `{0}`, `{1}`, … and `{ver}`;
//! - automatic auth, version, beta, and static header injection;
//! - dispatch with bounded retry and doubling backoff;
//! - typed response resolution that never fails on body shape;
//! - Server-Sent-Events streaming with UTF-8 safe chunk accumulation.
//!
//! # Getting started
//!
//! ```no_run
//! use crudkit::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Thread {
//!     id: String,
//! }
//!
//! # async fn run() -> ClientResult<()> {
//! let config = ClientConfiguration::new("OpenAI", "https://api.openai.com/{ver}")
//!     .with_api_key_env("OPENAI_API_KEY")
//!     .with_auth(AuthMode::Bearer)
//!     .with_version(VersionMode::Path, "v1")
//!     .with_beta_header("OpenAI-Beta", "assistants=v2");
//! let client = CrudClient::new(config)?;
//!
//! let threads = RouteTable::new("threads")
//!     .with(Operation::Create, "threads")
//!     .with(Operation::Get, "threads/{0}");
//!
//! let created: Option<Thread> = client
//!     .create(&threads, Request::new().with_body(serde_json::json!({})), vec![])
//!     .await?;
//! if let Some(thread) = created {
//!     let again: Option<Thread> = client
//!         .get(&threads, None, vec![PathParam::id(thread.id)])
//!         .await?;
//!     assert!(again.is_some());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Where to find things
//!
//! - **Dispatch calls:** [`CrudClient`](client::CrudClient), or
//!   [`SafeClient`](client::SafeClient) when failures should go to a
//!   [`FaultHandler`](client::FaultHandler) instead of the caller.
//! - **Describe routes:** [`RouteTable`], [`PathParam`], and
//!   [`RouteBuilder`](routing::RouteBuilder).
//! - **Configure a provider:** [`ClientConfiguration`] (also loadable from
//!   JSON) and [`auto_params`].
//! - **Stream:** [`StreamChunk`](api::StreamChunk) for the provider's chunk
//!   type, [`StreamEvent`](api::StreamEvent) for the lifecycle, and
//!   [`SseEngine`](api::SseEngine) for the parser itself.
//! - **Observe calls:** [`EventHandler`](client::EventHandler) and
//!   [`CaptureLayer`](diagnostics::CaptureLayer).
//! - **Swap the network layer:** implement [`Transport`](api::Transport).

pub mod api;
pub mod auto_params;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod prelude;
pub mod request;
pub mod routing;

pub use client::{CrudClient, SafeClient};
pub use config::ClientConfiguration;
pub use error::{ClientError, ClientResult, ErrorKind, TransportError};
pub use request::{Header, Request, Verb};
pub use routing::{Operation, PathParam, RouteTable};
