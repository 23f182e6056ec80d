//! A client that never propagates failures.
//!
//! [`SafeClient`] mirrors every [`CrudClient`] entry point. Errors and
//! panics inside a call become a [`ClientFault`], which is forwarded exactly
//! once to the configured [`FaultHandler`]; the call then returns `None` (or
//! `false` for deletes).

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::error;

use super::provider_error::extract_embedded_error;
use super::{CrudClient, DeletionStatus, EventChannel, ListResponse};
use crate::api::{StreamChunk, StreamEvent, StreamState};
use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::request::Request;
use crate::routing::{Operation, PathParam, RouteTable};

/// A failure reported by [`SafeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFault {
    pub api: String,
    pub operation: Operation,
    /// `None` for panics, [`ErrorKind::Provider`] when a provider error was
    /// recognized in the fault text.
    pub kind: Option<ErrorKind>,
    /// Humanized provider message when one was found, otherwise the raw text.
    pub message: String,
    /// The fault text as produced by the failing call.
    pub raw_message: String,
    pub status: Option<u16>,
}

impl ClientFault {
    pub fn is_panic(&self) -> bool {
        self.kind.is_none()
    }
}

/// Receives the faults of a [`SafeClient`].
pub trait FaultHandler: Send + Sync {
    fn on_fault(&self, fault: &ClientFault);
}

/// Logs faults at error level. The default handler.
pub struct LoggingFaultHandler;

impl FaultHandler for LoggingFaultHandler {
    fn on_fault(&self, fault: &ClientFault) {
        match fault.status {
            Some(status) => error!(
                "{} {} failed (HTTP {status}): {}",
                fault.api, fault.operation, fault.message
            ),
            None => error!("{} {} failed: {}", fault.api, fault.operation, fault.message),
        }
    }
}

/// A fault handler backed by a closure.
pub struct FnFaultHandler<F>(F)
where
    F: Fn(&ClientFault) + Send + Sync;

impl<F> FnFaultHandler<F>
where
    F: Fn(&ClientFault) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> FaultHandler for FnFaultHandler<F>
where
    F: Fn(&ClientFault) + Send + Sync,
{
    fn on_fault(&self, fault: &ClientFault) {
        (self.0)(fault)
    }
}

/// Exception-safe wrapper around a [`CrudClient`].
#[derive(Clone)]
pub struct SafeClient {
    inner: CrudClient,
    faults: Arc<dyn FaultHandler>,
}

impl SafeClient {
    pub fn new(inner: CrudClient) -> Self {
        Self {
            inner,
            faults: Arc::new(LoggingFaultHandler),
        }
    }

    pub fn with_fault_handler(mut self, handler: impl FaultHandler + 'static) -> Self {
        self.faults = Arc::new(handler);
        self
    }

    pub fn inner(&self) -> &CrudClient {
        &self.inner
    }

    pub async fn create<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> Option<T> {
        self.guard(Operation::Create, self.inner.create(routes, request, params))
            .await
            .flatten()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> Option<T> {
        self.guard(Operation::Get, self.inner.get(routes, request, params))
            .await
            .flatten()
    }

    pub async fn retrieve<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> Option<T> {
        self.guard(Operation::Retrieve, self.inner.retrieve(routes, request, params))
            .await
            .flatten()
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> Option<ListResponse<T>> {
        self.guard(Operation::List, self.inner.list(routes, request, params))
            .await
            .flatten()
    }

    pub async fn update<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> Option<T> {
        self.guard(Operation::Update, self.inner.update(routes, request, params))
            .await
            .flatten()
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> Option<T> {
        self.guard(Operation::Patch, self.inner.patch(routes, request, params))
            .await
            .flatten()
    }

    pub async fn cancel<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> Option<T> {
        self.guard(Operation::Cancel, self.inner.cancel(routes, request, params))
            .await
            .flatten()
    }

    pub async fn query<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> Option<T> {
        self.guard(Operation::Query, self.inner.query(routes, request, params))
            .await
            .flatten()
    }

    /// `false` on any fault.
    pub async fn delete<D: DeserializeOwned + DeletionStatus>(
        &self,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> bool {
        self.guard(Operation::Delete, self.inner.delete::<D>(routes, request, params))
            .await
            .unwrap_or(false)
    }

    pub async fn stream<C: StreamChunk>(
        &self,
        operation: Operation,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
        on_event: impl FnMut(&StreamEvent) + Send,
    ) -> Option<StreamState<C>> {
        self.guard(
            operation,
            self.inner.stream(operation, routes, request, params, on_event),
        )
        .await
    }

    pub async fn stream_bytes(
        &self,
        operation: Operation,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
        on_event: impl FnMut(&StreamEvent) + Send,
    ) -> Option<usize> {
        self.guard(
            operation,
            self.inner
                .stream_bytes(operation, routes, request, params, on_event),
        )
        .await
    }

    pub fn stream_channel<C>(
        &self,
        operation: Operation,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> SafeEventChannel<C>
    where
        C: StreamChunk + Send + 'static,
    {
        SafeEventChannel {
            channel: self
                .inner
                .stream_channel(operation, routes, request, params),
            client: self.clone(),
            operation,
        }
    }

    async fn guard<T>(
        &self,
        operation: Operation,
        call: impl Future<Output = ClientResult<T>>,
    ) -> Option<T> {
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                let raw = err.to_string();
                let err = self.humanize(err, &raw);
                let message = match &err {
                    ClientError::Provider { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                self.report(operation, Some(err.kind()), message, raw, status_of(&err));
                None
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.report(operation, None, message.clone(), message, None);
                None
            }
        }
    }

    /// Replace `err` with a [`ClientError::Provider`] when `text` carries a
    /// recognized provider error near the configured marker.
    fn humanize(&self, err: ClientError, text: &str) -> ClientError {
        let config = self.inner.config();
        let Some(marker) = config.stream.error_marker.as_deref() else {
            return err;
        };
        if marker.is_empty() || !text.contains(marker) {
            return err;
        }
        match extract_embedded_error(text, marker, self.inner.error_parser(), &config.api_name) {
            Some(message) => ClientError::Provider {
                api: config.api_name.clone(),
                status: status_of(&err),
                message,
            },
            None => err,
        }
    }

    fn report(
        &self,
        operation: Operation,
        kind: Option<ErrorKind>,
        message: String,
        raw_message: String,
        status: Option<u16>,
    ) {
        self.faults.on_fault(&ClientFault {
            api: self.inner.config().api_name.clone(),
            operation,
            kind,
            message,
            raw_message,
            status,
        });
    }
}

/// [`EventChannel`] whose final result goes through the fault handler.
pub struct SafeEventChannel<C> {
    channel: EventChannel<C>,
    client: SafeClient,
    operation: Operation,
}

impl<C> SafeEventChannel<C> {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.channel.recv().await
    }

    /// The final state, or `None` after reporting the fault.
    pub async fn finish(self) -> Option<StreamState<C>> {
        let Self {
            channel,
            client,
            operation,
        } = self;
        client.guard(operation, channel.finish()).await
    }
}

fn status_of(err: &ClientError) -> Option<u16> {
    match err {
        ClientError::RequestFailed { source, .. } => source.status(),
        ClientError::Provider { status, .. } => *status,
        _ => None,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (non-string payload)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn panic_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "panic: boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "panic: bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "panic: (non-string payload)");
    }

    #[test]
    fn status_extraction() {
        let err = ClientError::RequestFailed {
            attempts: 1,
            source: TransportError::Status {
                status: 403,
                body: String::new(),
            },
        };
        assert_eq!(status_of(&err), Some(403));
        assert_eq!(status_of(&ClientError::Cancelled), None);
        let provider = ClientError::Provider {
            api: "A".into(),
            message: "A: quota".into(),
            status: Some(429),
        };
        assert_eq!(status_of(&provider), Some(429));
    }
}
