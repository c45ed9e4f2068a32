//! Connection management
//!
//! This module handles:
//! * Transport abstraction (TCP vs Unix socket)
//! * The per-socket protocol session (startup, auth, query execution)
//! * State machine enforcement
//! * Result accumulation

mod conn;
mod results;
mod session;
mod state;
mod transport;

pub use conn::Connection;
pub use results::ResultSet;
pub use session::{Completion, Credentials, Session, Statement};
pub use state::ConnectionState;
pub use transport::Transport;
