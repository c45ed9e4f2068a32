//! Error types

use crate::auth::ScramError;
use std::io;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration, detected before any connection attempt
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Wire protocol violation (unsupported tag, malformed frame, bad result type)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection status guard violated
    #[error("invalid connection state: expected {expected}, got {actual}")]
    InvalidState {
        /// Status the operation required
        expected: String,
        /// Status the connection was actually in
        actual: String,
    },

    /// Authentication failed or the server asked for an unsupported mechanism
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// SASL exchange failure
    #[error("SASL error: {0}")]
    Sasl(#[from] ScramError),

    /// Error reported by the server (severity ERROR, FATAL or PANIC)
    #[error("{0}")]
    Server(ServerError),

    /// Value could not be coerced to its column type
    #[error("type error: {0}")]
    Type(String),

    /// Pool capacity or bookkeeping failure
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// Socket closed while an operation was pending
    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Whether this error came from the server rather than from the client side
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Server(_))
    }

    /// SQLSTATE code if this is a server-reported error
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(err) => Some(err.code.as_str()),
            _ => None,
        }
    }
}

/// Structured error reported through an ErrorResponse frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    /// Localized severity (ERROR, FATAL, PANIC, ...)
    pub severity: String,
    /// Non-localized severity
    pub vseverity: Option<String>,
    /// SQLSTATE code
    pub code: String,
    /// Primary message
    pub message: String,
    /// Additional detail
    pub detail: Option<String>,
    /// Hint
    pub hint: Option<String>,
    /// Cursor position in the query string
    pub position: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source file reporting the error
    pub file: Option<String>,
    /// Source line reporting the error
    pub line: Option<String>,
    /// Source routine reporting the error
    pub routine: Option<String>,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.code)?;
        if let Some(ref detail) = self.detail {
            write!(f, "\nDetail: {}", detail)?;
        }
        if let Some(ref hint) = self.hint {
            write!(f, "\nHint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {}

/// Pool-level failures reported to the immediate caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every slot exists and none is ready for a query
    #[error("all {max} connections are busy; retry later or raise max_connections")]
    Exhausted {
        /// Configured maximum
        max: u32,
    },

    /// No socket tracked under this id
    #[error("socket {0} does not exist in the pool")]
    NoSocket(u64),

    /// Socket is mid-operation
    #[error("socket {id} is {status}, not ready_for_query")]
    NotReady {
        /// Socket id
        id: u64,
        /// Status at the time of the request
        status: String,
    },

    /// Parameter type cannot be written as an SQL literal
    #[error("parameter ${index} has a type that cannot be written as an SQL literal")]
    UnsupportedValue {
        /// One-based placeholder index
        index: usize,
    },

    /// Placeholder refers past the end of the parameter list
    #[error("placeholder ${index} has no matching parameter ({count} given)")]
    MissingValue {
        /// One-based placeholder index
        index: usize,
        /// Number of parameters supplied
        count: usize,
    },
}
