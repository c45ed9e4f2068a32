//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket, or the socket was torn down
    #[default]
    Disconnected,

    /// Terminate sent, waiting for the socket to close
    Disconnecting,

    /// Server accepted the credentials, waiting for the first ReadyForQuery
    Connected,

    /// Socket is being opened
    Connecting,

    /// Startup sent, authentication exchange in progress
    Authing,

    /// Parse sent, waiting for ParseComplete
    Parsing,

    /// Rows may arrive
    Querying,

    /// Parse acknowledged (or skipped), waiting for BindComplete
    ParseComplete,

    /// Idle
    ReadyForQuery,

    /// CommandComplete received, waiting for ReadyForQuery
    ReadyForResults,

    /// A guard or server error failed the connection
    Error,

    /// The socket itself failed
    InternalError,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Authing)
                | (Authing, Connected)
                | (Connected, ReadyForQuery)
                | (ReadyForQuery, Parsing)
                | (ReadyForQuery, ParseComplete)
                | (ReadyForQuery, Querying)
                | (ReadyForQuery, Disconnecting)
                | (Parsing, ParseComplete)
                | (ParseComplete, Querying)
                | (Querying, ReadyForResults)
                | (ReadyForResults, ReadyForQuery)
                | (Disconnecting, Disconnected)
                | (_, Error)
                | (_, InternalError)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {}", self),
                actual: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    /// Fail unless currently in `required`
    pub fn expect(&self, required: ConnectionState) -> Result<()> {
        if *self != required {
            return Err(Error::InvalidState {
                expected: required.to_string(),
                actual: self.to_string(),
            });
        }
        Ok(())
    }

    /// Failure-absorbing states
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Error | Self::InternalError)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Disconnecting => write!(f, "disconnecting"),
            Self::Connected => write!(f, "connected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Authing => write!(f, "authing"),
            Self::Parsing => write!(f, "parsing"),
            Self::Querying => write!(f, "querying"),
            Self::ParseComplete => write!(f, "parse_complete"),
            Self::ReadyForQuery => write!(f, "ready_for_query"),
            Self::ReadyForResults => write!(f, "ready_for_results"),
            Self::Error => write!(f, "error"),
            Self::InternalError => write!(f, "internal_error"),
        }
    }
}
