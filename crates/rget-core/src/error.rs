//! Transfer-level and per-attempt error types.

use std::fmt;
use std::io;

/// Terminal transfer failure surfaced to the caller.
///
/// Callers observe either a working stream immediately, or exactly one of
/// these before any bytes are handed back; transient fetch failures are
/// recovered internally and never appear here unless a retry cap is hit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Every candidate endpoint failed the liveness probe.
    #[error("no workers available")]
    NoWorkersAvailable,
    /// No endpoint yielded a parseable Content-Range total.
    #[error("size discovery failed: {0}")]
    SizeDiscovery(String),
    /// The caller canceled the transfer.
    #[error("transfer canceled")]
    Canceled,
    /// A range exhausted the configured attempt cap.
    #[error("range {index} failed after {attempts} attempts")]
    RetriesExhausted { index: usize, attempts: u32 },
    /// The writer side shut down before all bytes were delivered.
    #[error("stream closed before all bytes were written")]
    ClosedEarly,
    /// The HTTP client could not be constructed.
    #[error("http client: {0}")]
    Client(String),
}

impl TransferError {
    /// Convert to an `io::Error` for surfacing through a reader.
    pub fn into_io(self) -> io::Error {
        io::Error::other(self)
    }
}

/// Error from a single range fetch attempt. Never surfaced to the caller;
/// drives the requeue-with-backoff path.
#[derive(Debug)]
pub enum FetchError {
    /// The HTTP request failed (timeout, connection refused, reset, etc.).
    Request(reqwest::Error),
    /// Response status was neither 200 nor 206.
    Http(u16),
    /// Response body was shorter than the requested range. Treated as a
    /// failure, not a partial success: no partial credit for short reads.
    ShortBody { expected: u64, received: u64 },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Request(e) => write!(f, "{}", e),
            FetchError::Http(code) => write!(f, "HTTP {}", code),
            FetchError::ShortBody { expected, received } => {
                write!(f, "short body: expected {} bytes, got {}", expected, received)
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Request(e) => Some(e),
            FetchError::Http(_) | FetchError::ShortBody { .. } => None,
        }
    }
}
