//! Connection pool
//!
//! * Sockets open lazily, up to `max_connections`
//! * Each socket closes itself once its connection timeout elapses while idle
//! * Any failed operation removes its socket from the pool
//! * Prepared statements are parsed once per socket and reused by name

mod config;
mod lifecycle;
mod params;
mod prepare;

pub use config::{PoolConfig, MAX_CONNECTIONS_LIMIT};
pub use lifecycle::{DisconnectStatus, Pool, QueryResults};
pub use params::substitute_params;
pub use prepare::{bind_values, PrepareOptions, Prepared};
