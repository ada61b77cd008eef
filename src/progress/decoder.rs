//! Incremental decoder for `data: <json>` line streams.
//!
//! Chunk boundaries carry no meaning: a record may be split over several
//! chunks and one chunk may hold several records. Complete lines are decoded
//! as soon as their terminator arrives; a trailing partial line is carried over
//! to the next `feed` call.

use serde_json::Value;

use crate::error::DecodeError;

pub const DATA_PREFIX: &str = "data: ";

/// One logical record extracted from the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Data(Value),
    Malformed(DecodeError),
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Record> {
        self.buffer.extend_from_slice(chunk);
        let mut records = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + offset;
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            self.scanned = 0;
            if let Some(record) = decode_line(line) {
                records.push(record);
            }
        }
        self.scanned = self.buffer.len();
        records
    }

    /// Flush the final unterminated line, if any.
    pub fn finish(&mut self) -> Vec<Record> {
        let line = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if line.is_empty() {
            return Vec::new();
        }
        decode_line(line).into_iter().collect()
    }

    /// Drop any carried-over bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(mut line: Vec<u8>) -> Option<Record> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if !line.starts_with(DATA_PREFIX.as_bytes()) {
        return None;
    }
    let text = match String::from_utf8(line) {
        Ok(text) => text,
        Err(err) => {
            return Some(Record::Malformed(DecodeError {
                line: String::from_utf8_lossy(err.as_bytes()).into_owned(),
                reason: "invalid utf-8".to_string(),
            }))
        }
    };
    let payload = &text[DATA_PREFIX.len()..];
    Some(match serde_json::from_str::<Value>(payload) {
        Ok(value) => Record::Data(value),
        Err(err) => Record::Malformed(DecodeError {
            line: text.clone(),
            reason: err.to_string(),
        }),
    })
}
