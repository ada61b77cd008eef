//! The two transports a pull can arrive on, behind one `next_frame` interface.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::PullError;

/// Which wire protocol a pull uses. Chosen by the caller per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Named `progress` / `error` / `done` events over an event-stream.
    #[value(name = "push")]
    #[serde(alias = "push")]
    PushChannel,
    /// Chunked body of `data: <json>` lines.
    #[value(name = "stream")]
    #[serde(alias = "stream")]
    ByteStream,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::PushChannel => "push_channel",
            TransportKind::ByteStream => "byte_stream",
        }
    }
}

impl FromStr for TransportKind {
    type Err = PullError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" | "push_channel" => Ok(TransportKind::PushChannel),
            "stream" | "byte_stream" => Ok(TransportKind::ByteStream),
            other => Err(PullError::Config(format!(
                "Unknown transport '{}' (expected 'push' or 'stream')",
                other
            ))),
        }
    }
}

/// One named event from a push channel; `data` is the raw JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    pub name: String,
    pub data: String,
}

impl PushEvent {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// What a transport yields on each read.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(PushEvent),
    Chunk(Bytes),
}

pub type PushEventStream = BoxStream<'static, Result<PushEvent, PullError>>;
pub type ByteChunkStream = BoxStream<'static, Result<Bytes, PullError>>;

/// An open connection for one pull. Dropping it closes the connection.
pub enum Transport {
    PushChannel(PushEventStream),
    ByteStream(ByteChunkStream),
}

impl Transport {
    pub fn push_channel<S>(events: S) -> Self
    where
        S: Stream<Item = Result<PushEvent, PullError>> + Send + 'static,
    {
        Transport::PushChannel(events.boxed())
    }

    pub fn byte_stream<S>(chunks: S) -> Self
    where
        S: Stream<Item = Result<Bytes, PullError>> + Send + 'static,
    {
        Transport::ByteStream(chunks.boxed())
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::PushChannel(_) => TransportKind::PushChannel,
            Transport::ByteStream(_) => TransportKind::ByteStream,
        }
    }

    /// Next event or chunk; `None` once the remote end closes.
    pub async fn next_frame(&mut self) -> Option<Result<Frame, PullError>> {
        match self {
            Transport::PushChannel(events) => events.next().await.map(|r| r.map(Frame::Event)),
            Transport::ByteStream(chunks) => chunks.next().await.map(|r| r.map(Frame::Chunk)),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transport").field(&self.kind()).finish()
    }
}
