//! Structural message reassembly for the unframed JSON wire format.
//!
//! The protocol carries no length prefix: a message is complete exactly when
//! the bytes accumulated so far parse as a JSON document of the expected
//! shape. A failed parse means more bytes are still in flight, never an
//! error. A successful parse into the wrong shape is a protocol violation
//! and tears down the connection.
//!
//! Known limit of the heuristic: two messages concatenated in one
//! accumulation do not form a single valid JSON document and will never
//! complete. Well-behaved peers send one request and wait for the reply, so
//! the case does not arise in practice; it is kept for wire compatibility.

use serde::de::DeserializeOwned;
use thiserror::Error;

use super::{MetricRecord, MetricReport};

/// Frame-level protocol violations.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Bytes parsed as JSON but not as the expected message shape.
    #[error("message shape mismatch: {0}")]
    Shape(#[source] serde_json::Error),

    /// Bytes parsed as JSON but the top-level value is not an array.
    #[error("expected a JSON array, got {0}")]
    NotAnArray(&'static str),
}

/// Accumulates bytes from one connection until they form a complete message.
#[derive(Debug, Default)]
pub struct MessageFramer {
    buf: Vec<u8>,
}

impl MessageFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the peer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes buffered awaiting completion.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discard any buffered bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Try to complete a request message.
    ///
    /// Returns `Ok(None)` while the accumulation is not yet valid JSON.
    /// On completion the internal buffer is cleared.
    pub fn try_request(&mut self) -> Result<Option<Vec<MetricRecord>>, FrameError> {
        let value = match self.parse_value() {
            Some(v) => v,
            None => return Ok(None),
        };

        let records = Self::into_shape::<Vec<MetricRecord>>(value)?;
        self.buf.clear();
        Ok(Some(records))
    }

    /// Try to complete a reply message.
    ///
    /// Replies have no marker of their own; completion is keyed on the
    /// element count of the request still outstanding. An array with a
    /// different count is treated as a partial read and accumulation
    /// continues.
    pub fn try_reply(&mut self, expected: usize) -> Result<Option<Vec<MetricReport>>, FrameError> {
        let value = match self.parse_value() {
            Some(v) => v,
            None => return Ok(None),
        };

        let arr = match value.as_array() {
            Some(arr) => arr,
            None => return Err(FrameError::NotAnArray(json_type_name(&value))),
        };

        if arr.len() != expected {
            return Ok(None);
        }

        let reports = Self::into_shape::<Vec<MetricReport>>(value)?;
        self.buf.clear();
        Ok(Some(reports))
    }

    /// Parse the accumulation as any JSON value, or None if still partial.
    fn parse_value(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.buf).ok()
    }

    fn into_shape<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, FrameError> {
        serde_json::from_value(value).map_err(FrameError::Shape)
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
