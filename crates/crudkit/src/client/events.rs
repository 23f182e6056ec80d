//! Lifecycle events emitted by [`CrudClient`](super::CrudClient).
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget clients |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |
//! | Custom `impl EventHandler` | Metrics, audit trails, UI updates |

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::CallContext;
use crate::error::{ClientError, TransportError};
use crate::request::Verb;

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the dispatcher during one call.
#[derive(Debug)]
pub enum ClientEvent<'a> {
    /// The endpoint is resolved and the first attempt is about to go out.
    RequestStarted { ctx: &'a CallContext, verb: Verb },
    /// An attempt failed with a retryable error; the next one follows
    /// after `delay`.
    RetryScheduled {
        ctx: &'a CallContext,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: &'a TransportError,
    },
    /// The transport returned a 2xx response. Fired before resolution.
    Completed { ctx: &'a CallContext, status: u16 },
    /// The call failed. Fired once per failed call.
    Failed {
        ctx: &'a CallContext,
        error: &'a ClientError,
    },
    /// A streaming connection opened.
    StreamStarted { ctx: &'a CallContext, status: u16 },
    /// A stream ended. `completed` is `false` when the stream was cut short
    /// by cancellation or a transport failure.
    StreamFinished {
        ctx: &'a CallContext,
        chars: usize,
        completed: bool,
    },
}

impl ClientEvent<'_> {
    /// The context of the call this event belongs to.
    pub fn context(&self) -> &CallContext {
        match self {
            ClientEvent::RequestStarted { ctx, .. }
            | ClientEvent::RetryScheduled { ctx, .. }
            | ClientEvent::Completed { ctx, .. }
            | ClientEvent::Failed { ctx, .. }
            | ClientEvent::StreamStarted { ctx, .. }
            | ClientEvent::StreamFinished { ctx, .. } => ctx,
        }
    }
}

/// Handler for client events.
///
/// # Example
///
/// ```
/// use crudkit::client::{ClientEvent, EventHandler};
///
/// struct Audit;
///
/// impl EventHandler for Audit {
///     fn on_event(&self, event: &ClientEvent<'_>) {
///         if let ClientEvent::Completed { ctx, status } = event {
///             println!("{} -> {status}", ctx.label());
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &ClientEvent<'_>) {
        let _ = event;
    }
}

/// A no-op event handler.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&ClientEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&ClientEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&ClientEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &ClientEvent<'_>) {
        (self.0)(event)
    }
}

/// An event handler that delegates to multiple inner handlers, in
/// registration order.
///
/// ```
/// use crudkit::client::{CompositeEventHandler, LoggingHandler, NoopHandler};
///
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(false, NoopHandler);
/// assert_eq!(handler.len(), 1);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler to the chain.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &ClientEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &ClientEvent<'_>) {
        match event {
            ClientEvent::RequestStarted { ctx, verb } => {
                debug!(
                    "[{}] {verb} {} ({})",
                    ctx.trace_id,
                    ctx.endpoint_or_unknown(),
                    ctx.label()
                );
            }
            ClientEvent::RetryScheduled {
                ctx,
                attempt,
                max_attempts,
                delay,
                error,
            } => {
                warn!(
                    "[{}] {} attempt {attempt}/{max_attempts} failed: {error}. Retrying in {:.1}s",
                    ctx.trace_id,
                    ctx.label(),
                    delay.as_secs_f64()
                );
            }
            ClientEvent::Completed { ctx, status } => {
                info!("{} HTTP {status}", ctx.summary());
            }
            ClientEvent::Failed { ctx, error } => {
                warn!("{} failed: {error}", ctx.summary());
            }
            ClientEvent::StreamStarted { ctx, status } => {
                debug!("[{}] stream opened ({status})", ctx.trace_id);
            }
            ClientEvent::StreamFinished {
                ctx,
                chars,
                completed,
            } => {
                if *completed {
                    info!("{} streamed {chars} chars", ctx.summary());
                } else {
                    warn!("{} stream interrupted after {chars} chars", ctx.summary());
                }
            }
        }
    }
}
