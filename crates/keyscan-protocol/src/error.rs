//! Protocol error types for RESP reply parsing.

use thiserror::Error;

/// Errors that can occur when parsing a reply off the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer doesn't hold a complete reply yet. Read more and retry.
    #[error("incomplete frame: need more data")]
    Incomplete,

    /// The first byte of a frame didn't match any known type prefix.
    #[error("invalid type prefix: {0:#04x}")]
    InvalidPrefix(u8),

    /// A length or integer line wasn't a valid decimal i64.
    #[error("invalid integer encoding")]
    InvalidInteger,

    /// A bulk string or aggregate declared a length we refuse to honour.
    #[error("invalid frame length: {0}")]
    InvalidFrameLength(i64),

    /// A simple string or error line wasn't valid utf-8.
    #[error("invalid utf-8 in {0} line")]
    InvalidUtf8(&'static str),

    /// Aggregates nested deeper than the parser allows.
    #[error("reply nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}
