//! Client configuration and the single-connection client

mod config;
pub(crate) mod connection_string;
mod pg_client;

pub use config::{ClientConfig, ClientConfigBuilder, Endpoint, Password};
pub use connection_string::ConnectionInfo;
pub use pg_client::Client;
