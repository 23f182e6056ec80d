//! The generic CRUD dispatcher.
//!
//! [`CrudClient`] drives every call through the same pipeline:
//!
//! 1. contract checks (body-carrying operations need a body, a request is
//!    dispatched at most once);
//! 2. client defaults, then [`auto_params::apply`](crate::auto_params::apply);
//! 3. [`RouteBuilder::build`] and endpoint assignment;
//! 4. transport with bounded retry ([`run_with_retry`]);
//! 5. the `Completed` event, then [`resolver::resolve`].
//!
//! Streaming calls share steps 1 to 3, retry only the connection, and hand
//! the byte flushes to an [`SseEngine`].
//!
//! [`SafeClient`] wraps a client so no call ever propagates a failure.

pub mod events;
pub mod facade;
pub mod payload;
pub mod provider_error;
pub mod resolver;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::api::retry::RetryNotice;
use crate::api::streaming::{pump_bytes, pump_sse};
use crate::api::transport::execute_checked;
use crate::api::{
    CallContext, HttpRequest, HttpResponse, ReqwestTransport, RetryPolicy, SseEngine, StreamChunk,
    StreamEvent, StreamResponse, StreamState, Transport, run_with_retry,
};
use crate::auto_params;
use crate::config::ClientConfiguration;
use crate::error::{ClientError, ClientResult, TransportError};
use crate::request::Request;
use crate::routing::{Operation, PathParam, RouteBuilder, RouteTable};

pub use events::{
    ClientEvent, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
};
pub use facade::{
    ClientFault, FaultHandler, FnFaultHandler, LoggingFaultHandler, SafeClient, SafeEventChannel,
};
pub use payload::{DeleteResponse, DeletionStatus, ListResponse};
pub use provider_error::{DefaultErrorParser, ErrorParser, extract_embedded_error};
pub use resolver::{RawOutcome, resolve};

/// Generic client for one provider API.
///
/// Cheap to clone: configuration, transport, and handlers are shared.
#[derive(Clone)]
pub struct CrudClient {
    config: Arc<ClientConfiguration>,
    transport: Arc<dyn Transport>,
    error_parser: Arc<dyn ErrorParser>,
    events: Arc<dyn EventHandler>,
}

impl CrudClient {
    /// A client using the default [`ReqwestTransport`].
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfiguration) -> ClientResult<Self> {
        Ok(Self::with_transport(config, ReqwestTransport::new()?))
    }

    /// A client using a custom [`Transport`].
    pub fn with_transport(config: ClientConfiguration, transport: impl Transport + 'static) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            error_parser: Arc::new(DefaultErrorParser),
            events: Arc::new(NoopHandler),
        }
    }

    pub fn with_error_parser(mut self, parser: impl ErrorParser + 'static) -> Self {
        self.error_parser = Arc::new(parser);
        self
    }

    pub fn with_event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.events = Arc::new(handler);
        self
    }

    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    pub fn error_parser(&self) -> &dyn ErrorParser {
        self.error_parser.as_ref()
    }

    // ── CRUD entry points ──

    /// `POST` a new resource.
    pub async fn create<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> ClientResult<Option<T>> {
        self.dispatch(Operation::Create, routes, Some(request), params)
            .await
    }

    /// `GET` one resource.
    pub async fn get<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> ClientResult<Option<T>> {
        self.dispatch(Operation::Get, routes, request, params).await
    }

    /// Same as [`get`](Self::get); uses the `Retrieve` template when one is
    /// registered.
    pub async fn retrieve<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> ClientResult<Option<T>> {
        self.dispatch(Operation::Retrieve, routes, request, params)
            .await
    }

    /// `GET` a collection, as a bare array or a `data` envelope.
    pub async fn list<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> ClientResult<Option<ListResponse<T>>> {
        self.dispatch(Operation::List, routes, request, params)
            .await
    }

    /// `POST` a full replacement.
    pub async fn update<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> ClientResult<Option<T>> {
        self.dispatch(Operation::Update, routes, Some(request), params)
            .await
    }

    /// `PATCH` a resource.
    pub async fn patch<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> ClientResult<Option<T>> {
        self.dispatch(Operation::Patch, routes, Some(request), params)
            .await
    }

    /// `POST` a cancellation.
    pub async fn cancel<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> ClientResult<Option<T>> {
        self.dispatch(Operation::Cancel, routes, request, params)
            .await
    }

    /// `POST` a query (search, count, embed, ...).
    pub async fn query<T: DeserializeOwned>(
        &self,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> ClientResult<Option<T>> {
        self.dispatch(Operation::Query, routes, Some(request), params)
            .await
    }

    /// `DELETE` a resource and report whether the API confirmed deletion.
    ///
    /// An empty 2xx body counts as deleted. Any other body is resolved as
    /// `D` and checked with [`DeletionStatus::is_deleted`]; a body that does
    /// not resolve counts as not deleted.
    pub async fn delete<D: DeserializeOwned + DeletionStatus>(
        &self,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> ClientResult<bool> {
        let (response, ctx) = self.call(Operation::Delete, routes, request, params).await?;
        match self.classify::<D>(&response) {
            RawOutcome::Empty => {
                debug!("[{}] empty delete response, treating as deleted", ctx.trace_id);
                Ok(true)
            }
            outcome => Ok(resolve(&ctx, outcome).is_some_and(|d| d.is_deleted())),
        }
    }

    /// Run `operation` and resolve the body as `T`.
    ///
    /// # Errors
    ///
    /// Contract, configuration, and route errors before transport;
    /// [`ClientError::RequestFailed`] or [`ClientError::Cancelled`] from
    /// transport. Body shapes never fail: they resolve to `None`.
    pub async fn dispatch<T: DeserializeOwned>(
        &self,
        operation: Operation,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> ClientResult<Option<T>> {
        let (response, ctx) = self.call(operation, routes, request, params).await?;
        Ok(resolve(&ctx, self.classify::<T>(&response)))
    }

    fn classify<T: DeserializeOwned>(&self, response: &HttpResponse) -> RawOutcome<T> {
        RawOutcome::from_body(
            &response.body,
            self.error_parser.as_ref(),
            &self.config.api_name,
        )
    }

    // ── Streaming entry points ──

    /// Open an SSE stream and deliver events to `on_event` as they are
    /// parsed. Returns the final stream state.
    ///
    /// # Errors
    ///
    /// As for [`dispatch`](Self::dispatch). A transport failure after the
    /// first flush is reported as [`ClientError::RequestFailed`] and is
    /// never retried; the `Error` event precedes it and no `Done` follows.
    pub async fn stream<C: StreamChunk>(
        &self,
        operation: Operation,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
        mut on_event: impl FnMut(&StreamEvent) + Send,
    ) -> ClientResult<StreamState<C>> {
        let mut ctx = self.context(operation, routes, Some(&request));
        let opened = self
            .open_stream(&mut ctx, operation, routes, request, params)
            .await;
        let (response, cancel) = match opened {
            Ok(opened) => opened,
            Err(e) => return Err(self.fail(&ctx, e)),
        };

        let mut engine = SseEngine::<C>::from_config(&self.config);
        let pumped = pump_sse(response.flushes, &mut engine, &cancel, &mut on_event).await;
        let state = engine.into_state();
        self.events.on_event(&ClientEvent::StreamFinished {
            ctx: &ctx,
            chars: state.text.len(),
            completed: pumped.is_ok(),
        });
        match pumped {
            Ok(()) => Ok(state),
            Err(e) => Err(self.fail(&ctx, stream_error(e, ctx.attempts))),
        }
    }

    /// Like [`stream`](Self::stream), but events arrive on a channel owned
    /// by the returned [`EventChannel`]. The call runs on a spawned task.
    pub fn stream_channel<C>(
        &self,
        operation: Operation,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> EventChannel<C>
    where
        C: StreamChunk + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.clone();
        let routes = routes.clone();
        let task = tokio::spawn(async move {
            client
                .stream::<C>(operation, &routes, request, params, move |event| {
                    // A dropped receiver only means nobody is listening.
                    let _ = tx.send(event.clone());
                })
                .await
        });
        EventChannel { events: rx, task }
    }

    /// Open a stream and deliver undecoded byte chunks. Returns the total
    /// number of bytes received.
    pub async fn stream_bytes(
        &self,
        operation: Operation,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
        mut on_event: impl FnMut(&StreamEvent) + Send,
    ) -> ClientResult<usize> {
        let mut ctx = self.context(operation, routes, Some(&request));
        let (response, cancel) = match self
            .open_stream(&mut ctx, operation, routes, request, params)
            .await
        {
            Ok(opened) => opened,
            Err(e) => return Err(self.fail(&ctx, e)),
        };

        let pumped = pump_bytes(response.flushes, &cancel, &mut on_event).await;
        self.events.on_event(&ClientEvent::StreamFinished {
            ctx: &ctx,
            chars: *pumped.as_ref().unwrap_or(&0),
            completed: pumped.is_ok(),
        });
        pumped.map_err(|e| self.fail(&ctx, stream_error(e, ctx.attempts)))
    }

    // ── Pipeline ──

    fn context(
        &self,
        operation: Operation,
        routes: &RouteTable,
        request: Option<&Request>,
    ) -> CallContext {
        CallContext::new(
            self.config.api_name.clone(),
            routes.service(),
            operation,
            request.and_then(Request::name).map(str::to_owned),
        )
    }

    fn fail(&self, ctx: &CallContext, error: ClientError) -> ClientError {
        self.events.on_event(&ClientEvent::Failed { ctx, error: &error });
        error
    }

    /// Steps 1 to 3: validate, decorate, route.
    fn prepare(
        &self,
        ctx: &mut CallContext,
        operation: Operation,
        routes: &RouteTable,
        request: Option<Request>,
        mut params: Vec<PathParam>,
    ) -> ClientResult<Request> {
        let mut request = match request {
            Some(request) => request,
            None if operation.requires_body() => {
                return Err(ClientError::contract(format!(
                    "{operation} requires a request with a body"
                )));
            }
            None => Request::new(),
        };
        if operation.requires_body() && !request.has_body() {
            return Err(ClientError::contract(format!(
                "{operation} requires a request with a body"
            )));
        }
        if let Some(endpoint) = request.endpoint() {
            return Err(ClientError::contract(format!(
                "request was already dispatched to {endpoint}"
            )));
        }

        request.apply_defaults(&self.config.defaults);
        auto_params::apply(&self.config, &mut request, &mut params)?;
        let url = RouteBuilder::build(
            &self.config.base_url,
            operation,
            routes,
            request.route_override(),
            &params,
        )?;
        ctx.endpoint = Some(url.clone());
        request.set_endpoint(url)?;
        Ok(request)
    }

    async fn call(
        &self,
        operation: Operation,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> ClientResult<(HttpResponse, CallContext)> {
        let mut ctx = self.context(operation, routes, request.as_ref());
        match self.execute(&mut ctx, operation, routes, request, params).await {
            Ok(response) => Ok((response, ctx)),
            Err(e) => Err(self.fail(&ctx, e)),
        }
    }

    /// Steps 1 to 5 for buffered calls.
    async fn execute(
        &self,
        ctx: &mut CallContext,
        operation: Operation,
        routes: &RouteTable,
        request: Option<Request>,
        params: Vec<PathParam>,
    ) -> ClientResult<HttpResponse> {
        let request = self.prepare(ctx, operation, routes, request, params)?;
        let verb = operation.verb();
        let http = HttpRequest::from_request(&request, verb)?;
        if request.logging() {
            debug!(
                "[{}] request body: {}",
                ctx.trace_id,
                request.body().map(ToString::to_string).unwrap_or_default()
            );
        }

        self.events.on_event(&ClientEvent::RequestStarted { ctx, verb });
        let transport = self.transport.as_ref();
        let (response, attempts) = run_with_retry(
            &RetryPolicy::for_request(&request),
            request.cancellation(),
            |notice| self.retry_scheduled(ctx, notice),
            || execute_checked(transport, http.clone()),
        )
        .await
        .inspect_err(|e| {
            if let ClientError::RequestFailed { attempts, .. } = e {
                ctx.attempts = *attempts;
            }
        })?;
        ctx.attempts = attempts;

        if request.logging() {
            debug!("[{}] response body: {}", ctx.trace_id, response.text());
        } else {
            trace!("[{}] {} bytes", ctx.trace_id, response.body.len());
        }
        self.events.on_event(&ClientEvent::Completed {
            ctx,
            status: response.status,
        });
        Ok(response)
    }

    /// Steps 1 to 3, then open the stream. Only the connection is retried.
    async fn open_stream(
        &self,
        ctx: &mut CallContext,
        operation: Operation,
        routes: &RouteTable,
        request: Request,
        params: Vec<PathParam>,
    ) -> ClientResult<(StreamResponse, CancellationToken)> {
        let request = self.prepare(ctx, operation, routes, Some(request), params)?;
        let verb = operation.verb();
        let http = HttpRequest::from_request(&request, verb)?;

        self.events.on_event(&ClientEvent::RequestStarted { ctx, verb });
        let transport = self.transport.as_ref();
        let (response, attempts) = run_with_retry(
            &RetryPolicy::for_request(&request),
            request.cancellation(),
            |notice| self.retry_scheduled(ctx, notice),
            || transport.open_stream(http.clone()),
        )
        .await?;
        ctx.attempts = attempts;

        self.events.on_event(&ClientEvent::StreamStarted {
            ctx,
            status: response.status,
        });
        Ok((response, request.cancellation().clone()))
    }

    fn retry_scheduled(&self, ctx: &CallContext, notice: &RetryNotice<'_>) {
        self.events.on_event(&ClientEvent::RetryScheduled {
            ctx,
            attempt: notice.attempt,
            max_attempts: notice.max_attempts,
            delay: notice.delay,
            error: notice.error,
        });
    }
}

fn stream_error(error: TransportError, attempts: u32) -> ClientError {
    match error {
        TransportError::Cancelled => ClientError::Cancelled,
        source => ClientError::RequestFailed { attempts, source },
    }
}

/// Events of a stream running on a spawned task.
///
/// A finite sequence: it ends after `Done`, or earlier when the call fails.
pub struct EventChannel<C> {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    task: JoinHandle<ClientResult<StreamState<C>>>,
}

impl<C> EventChannel<C> {
    /// The next event, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Wait for the call to finish and return its final state. Events not
    /// yet received are dropped.
    pub async fn finish(self) -> ClientResult<StreamState<C>> {
        drop(self.events);
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(ClientError::Cancelled),
        }
    }
}
