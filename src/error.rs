//! Error types for poll-set sessions.

use std::fmt;
use std::io;

use crate::source::{Direction, SourceKind, SourceToken};
use crate::transport::CqErrEntry;

/// Session-fatal errors.
///
/// Every variant aborts the session; nothing is retried internally. A
/// zero-length successful wait is a normal condition, not an error, and
/// never reaches this type.
#[derive(Debug)]
pub enum Error {
    /// A source of this kind is already registered for the session.
    DuplicateSource(SourceKind),
    /// The handle registered for this kind is the wrong mechanism
    /// (a counter handle for a queue kind, or the reverse).
    HandleKindMismatch(SourceKind),
    /// A queue and a counter were both registered for the same direction.
    DualCompletionMode(Direction),
    /// The aggregation primitive rejected an add.
    PollSetAdd(io::Error),
    /// The blocking wait call failed.
    Poll(io::Error),
    /// A drain read on a completion queue failed.
    CqRead(io::Error),
    /// A completion queue reported an error entry instead of a completion.
    CqError(CqErrEntry),
    /// A counter source signaled readiness after it was already satisfied.
    DuplicateCounterEvent(Direction),
    /// A ready token did not resolve to any registered source.
    UnknownCompletion(SourceToken),
    /// Address resolution failed.
    Address(io::Error),
    /// Transport resource allocation failed.
    Resource(io::Error),
    /// Transport-level failure from a collaborator.
    Transport(io::Error),
}

impl Error {
    /// Process exit code for command-line wrappers.
    ///
    /// Internal error codes are negative, so the exit status is their
    /// negation.
    pub fn exit_code(&self) -> i32 {
        -self.code()
    }

    fn code(&self) -> i32 {
        match self {
            Error::DuplicateSource(_)
            | Error::HandleKindMismatch(_)
            | Error::DualCompletionMode(_) => -22, // EINVAL
            Error::DuplicateCounterEvent(_) | Error::UnknownCompletion(_) => -71, // EPROTO
            Error::CqError(e) => {
                if e.err == 0 {
                    -5 // EIO
                } else {
                    -e.err.abs()
                }
            }
            Error::PollSetAdd(e)
            | Error::Poll(e)
            | Error::CqRead(e)
            | Error::Address(e)
            | Error::Resource(e)
            | Error::Transport(e) => e.raw_os_error().map_or(-5, |c| -c.abs()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DuplicateSource(kind) => write!(f, "{} source already registered", kind),
            Error::HandleKindMismatch(kind) => {
                write!(f, "handle does not match the {} source kind", kind)
            }
            Error::DualCompletionMode(dir) => {
                write!(f, "{} direction configured with both a queue and a counter", dir)
            }
            Error::PollSetAdd(e) => write!(f, "poll set add failed: {}", e),
            Error::Poll(e) => write!(f, "poll wait failed: {}", e),
            Error::CqRead(e) => write!(f, "completion queue read failed: {}", e),
            Error::CqError(e) => write!(f, "completion error entry: {}", e),
            Error::DuplicateCounterEvent(dir) => {
                write!(f, "invalid {} counter event: counter already satisfied", dir)
            }
            Error::UnknownCompletion(token) => {
                write!(f, "unknown completion token {}", token.as_raw())
            }
            Error::Address(e) => write!(f, "address resolution failed: {}", e),
            Error::Resource(e) => write!(f, "resource allocation failed: {}", e),
            Error::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::PollSetAdd(e)
            | Error::Poll(e)
            | Error::CqRead(e)
            | Error::Address(e)
            | Error::Resource(e)
            | Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Transport(e)
    }
}

/// Result type for poll-set operations.
pub type Result<T> = std::result::Result<T, Error>;
