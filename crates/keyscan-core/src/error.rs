//! Error types for keyspace scanning.

use thiserror::Error;

use crate::client::ConnectionError;

/// Message returned when a store rejects SCAN's TYPE option.
const TYPE_FILTER_UNSUPPORTED: &str =
    "filtering per key type is available for stores running redis 6.0 or later";

/// Errors returned by scanner operations.
///
/// A failed call never carries a partial page: if one shard fails, the
/// whole request fails.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The caller's opaque cursor does not parse against the current
    /// shard topology.
    #[error("incorrect cursor format: {0}")]
    MalformedCursor(String),

    /// The store's ACL rejected a command (`NOPERM`).
    #[error("{0}")]
    Forbidden(String),

    /// A command ran against a key of an incompatible type (`WRONGTYPE`).
    #[error("{0}")]
    WrongType(String),

    /// SCAN was sent a TYPE option the store doesn't understand.
    #[error("{}", TYPE_FILTER_UNSUPPORTED)]
    TypeFilterUnsupported,

    /// Any other error reply from the store.
    #[error("store error: {0}")]
    Store(String),

    /// The store replied with a shape we didn't expect for the command.
    #[error("unexpected reply to {command}: {detail}")]
    UnexpectedReply {
        command: &'static str,
        detail: String,
    },

    /// A command targeted a shard this client doesn't know about.
    #[error("unknown shard {0}")]
    UnknownShard(String),

    /// A keyless command was sent to a cluster without a target shard.
    #[error("cannot route {0} without a target shard")]
    NoRoute(String),

    /// Transport failure: I/O, protocol, timeout or disconnect.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Coarse classification of a [`ScanError`], for callers that translate
/// errors into responses of their own (HTTP status codes, exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was wrong: bad cursor, wrong type, bad filter.
    BadRequest,
    /// The store's ACL forbids the operation.
    Forbidden,
    /// The target shard isn't part of the topology.
    NotFound,
    /// The store couldn't be reached or went away mid-request.
    Unavailable,
    /// Anything else.
    Internal,
}

impl ScanError {
    /// Classifies an error reply by its prefix.
    pub fn from_reply(message: &str) -> Self {
        if message.starts_with("NOPERM") {
            ScanError::Forbidden(message.to_string())
        } else if message.starts_with("WRONGTYPE") {
            ScanError::WrongType(message.to_string())
        } else {
            ScanError::Store(message.to_string())
        }
    }

    /// Returns the coarse class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::MalformedCursor(_)
            | ScanError::WrongType(_)
            | ScanError::TypeFilterUnsupported => ErrorKind::BadRequest,
            ScanError::Forbidden(_) => ErrorKind::Forbidden,
            ScanError::UnknownShard(_) => ErrorKind::NotFound,
            ScanError::Connection(_) => ErrorKind::Unavailable,
            ScanError::Store(_) | ScanError::UnexpectedReply { .. } | ScanError::NoRoute(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns true for transport-level failures a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanError::Connection(_))
    }

    pub(crate) fn unexpected(command: &'static str, detail: impl Into<String>) -> Self {
        ScanError::UnexpectedReply {
            command,
            detail: detail.into(),
        }
    }
}
