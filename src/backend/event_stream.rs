//! `text/event-stream` framing for the push-channel transport.

use std::fmt::Display;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::PullError;
use crate::progress::PushEvent;

const DEFAULT_EVENT: &str = "message";

/// Accumulates bytes and yields complete events, one per blank-line
/// terminated block. `id:` and `retry:` fields are ignored.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl EventStreamParser {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn next_event(&mut self) -> Option<PushEvent> {
        loop {
            let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;
            let mut line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            line.pop();
            if let Some(b'\r') = line.last() {
                line.pop();
            }
            if line.is_empty() {
                if self.event.is_none() && self.data.is_empty() {
                    continue;
                }
                return Some(PushEvent {
                    name: self
                        .event
                        .take()
                        .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
                    data: std::mem::take(&mut self.data).join("\n"),
                });
            }
            if line.starts_with(b":") {
                continue;
            }
            let line = String::from_utf8_lossy(&line);
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_ref(), ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
    }
}

/// Turn an event-stream response body into push-channel events.
pub fn push_events<S, E>(body: S) -> impl Stream<Item = Result<PushEvent, PullError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    let state = (Box::pin(body), EventStreamParser::default(), false);
    futures::stream::unfold(state, |(mut body, mut parser, done)| async move {
        loop {
            if let Some(event) = parser.next_event() {
                return Some((Ok(event), (body, parser, done)));
            }
            if done {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => parser.push(&chunk),
                Some(Err(err)) => {
                    return Some((
                        Err(PullError::Transport(err.to_string())),
                        (body, parser, true),
                    ))
                }
                None => return None,
            }
        }
    })
}
