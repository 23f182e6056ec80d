//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use crudkit::api::{
    ByteStream, HttpRequest, HttpResponse, StreamResponse, Transport, TransportFuture,
};
use crudkit::config::{AuthMode, VersionMode};
use crudkit::{ClientConfiguration, Operation, RouteTable, TransportError};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Bearer auth with a `{ver}` path segment, pointed at `base`.
pub fn config(base: &str) -> ClientConfiguration {
    ClientConfiguration::new("Test", format!("{base}/{{ver}}"))
        .with_api_key("sk-test")
        .with_auth(AuthMode::Bearer)
        .with_version(VersionMode::Path, "v1")
}

pub fn threads() -> RouteTable {
    RouteTable::new("threads")
        .with(Operation::Create, "threads")
        .with(Operation::Get, "threads/{0}")
        .with(Operation::List, "threads")
        .with(Operation::Update, "threads/{0}")
        .with(Operation::Patch, "threads/{0}")
        .with(Operation::Delete, "threads/{0}")
        .with(Operation::Cancel, "threads/{0}/cancel")
        .with(Operation::Query, "threads/search")
}

/// What a scripted stream does after its chunks run out.
pub enum Tail {
    End,
    Fail(TransportError),
    Hang,
}

/// In-memory transport replaying scripted replies in order.
#[derive(Default)]
pub struct Scripted {
    replies: Mutex<Vec<Result<HttpResponse, TransportError>>>,
    streams: Mutex<Vec<(Vec<Vec<u8>>, Tail)>>,
    pub seen: Mutex<Vec<HttpRequest>>,
}

impl Scripted {
    pub fn replying(replies: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            ..Default::default()
        })
    }

    pub fn streaming(chunks: Vec<&[u8]>, tail: Tail) -> Arc<Self> {
        let chunks = chunks.into_iter().map(<[u8]>::to_vec).collect();
        Arc::new(Self {
            streams: Mutex::new(vec![(chunks, tail)]),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

/// Newtype so the foreign `Arc` can carry the transport impl.
#[derive(Clone)]
pub struct Shared(pub Arc<Scripted>);

impl Transport for Shared {
    fn execute(&self, request: HttpRequest) -> TransportFuture<'_, HttpResponse> {
        self.0.seen.lock().unwrap().push(request);
        let reply = self
            .0
            .replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Ok(HttpResponse::new(200, "")));
        Box::pin(async move { reply })
    }

    fn open_stream(&self, request: HttpRequest) -> TransportFuture<'_, StreamResponse> {
        self.0.seen.lock().unwrap().push(request);
        let scripted = self.0.streams.lock().unwrap().pop();
        Box::pin(async move {
            let (chunks, tail) =
                scripted.ok_or_else(|| TransportError::Protocol("no stream scripted".into()))?;
            let body = futures::stream::iter(chunks.into_iter().map(Ok));
            let flushes: ByteStream = match tail {
                Tail::End => Box::pin(body),
                Tail::Fail(e) => Box::pin(futures::StreamExt::chain(
                    body,
                    futures::stream::iter([Err(e)]),
                )),
                Tail::Hang => Box::pin(futures::StreamExt::chain(
                    body,
                    futures::stream::pending(),
                )),
            };
            Ok(StreamResponse {
                status: 200,
                flushes,
            })
        })
    }
}

/// A transport that panics on every call.
pub struct Panicking;

fn explode<T>() -> Result<T, TransportError> {
    panic!("transport exploded")
}

impl Transport for Panicking {
    fn execute(&self, _request: HttpRequest) -> TransportFuture<'_, HttpResponse> {
        Box::pin(async { explode() })
    }

    fn open_stream(&self, _request: HttpRequest) -> TransportFuture<'_, StreamResponse> {
        Box::pin(async { explode() })
    }
}
