//! Error and status types shared by every codec entry point.

use thiserror::Error;

/// Classifies a codec failure the way a caller is expected to react to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed user input: bad JSON syntax, a type mismatch, an
    /// out-of-range number, a duplicate field, and so on. By far the most
    /// common non-ok outcome.
    InvalidArgument,
    /// A type URL could not be resolved by the schema service.
    NotFound,
    /// The input stream terminated before a complete value was read.
    DataLoss,
    /// A reflection or schema-service invariant was broken. This is a bug in
    /// the schema or the codec, not a user error.
    Internal,
}

/// The error type returned by every fallible operation in this crate.
///
/// The rendered message of a JSON syntax error embeds the message path and
/// source location, but its exact whitespace is deliberately unstable; match
/// on [`Error::kind`] rather than on message text.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub(crate) fn data_loss(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataLoss, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// The failure class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns `true` if this error was caused by malformed user input.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        self.kind == ErrorKind::InvalidArgument
    }

    /// Returns `true` if a type URL could not be resolved.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Returns `true` if the input ended prematurely.
    #[must_use]
    pub fn is_data_loss(&self) -> bool {
        self.kind == ErrorKind::DataLoss
    }
}

/// Crate-wide result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;
