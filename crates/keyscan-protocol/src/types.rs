//! RESP frame types.
//!
//! The [`Frame`] enum represents one parsed reply. Blob strings use
//! `Bytes` so key names can travel from the socket buffer into scan
//! results without another copy.

use bytes::Bytes;

/// A single RESP reply frame.
///
/// Covers what a keyspace browser sees in practice: status lines, errors,
/// integers, bulk data, arrays, null and RESP3 maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple string response, e.g. `+OK\r\n` or the reply to `TYPE`.
    Simple(String),

    /// Error response, e.g. `-NOPERM ...\r\n`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Ordered array of frames.
    Array(Vec<Frame>),

    /// Null value: RESP3 `_\r\n`, or RESP2 `$-1\r\n` / `*-1\r\n`.
    Null,

    /// Ordered map of key-value frame pairs (RESP3 only).
    Map(Vec<(Frame, Frame)>),
}

impl Frame {
    /// Returns `true` if this frame is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Returns the message of an error reply.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Frame::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Reads the frame as an integer.
    ///
    /// Stores send some numbers (SCAN cursors, for one) as bulk strings,
    /// so decimal bulk and simple strings are accepted too.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Frame::Integer(n) => Some(*n),
            Frame::Bulk(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            Frame::Simple(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Reads the frame as text. Binary bulk data is decoded lossily.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Frame::Simple(s) => Some(s.clone()),
            Frame::Bulk(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Consumes the frame, returning its raw bytes for string replies.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Frame::Bulk(b) => Some(b),
            Frame::Simple(s) => Some(Bytes::from(s)),
            _ => None,
        }
    }

    /// Consumes the frame, returning its elements if it is an array.
    pub fn into_array(self) -> Option<Vec<Frame>> {
        match self {
            Frame::Array(items) => Some(items),
            _ => None,
        }
    }
}
