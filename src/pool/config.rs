//! Pool configuration

use crate::client::connection_string::construct_socket_path;
use crate::client::{ClientConfig, Endpoint, Password};
use crate::{Error, Result};
use std::time::Duration;

/// Upper bound on `max_connections`
pub const MAX_CONNECTIONS_LIMIT: u32 = 1000;

/// Settings for a [`Pool`](super::Pool)
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Parameters every socket connects with
    pub client: ClientConfig,
    /// How long a socket lives before the pool tries to close it
    pub connection_timeout: Duration,
    /// Most sockets open at once
    pub max_connections: u32,
}

impl PoolConfig {
    /// Defaults: 30 second timeout, 10 connections
    pub fn new(client: ClientConfig) -> Self {
        Self {
            client,
            connection_timeout: Duration::from_secs(30),
            max_connections: 10,
        }
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Read `POSTGRES_*` variables from the environment
    ///
    /// | Variable | Meaning | Default |
    /// |---|---|---|
    /// | `POSTGRES_DATABASE` | database name | required |
    /// | `POSTGRES_USERNAME` | user name | required |
    /// | `POSTGRES_PASSWORD` | password | trust authentication |
    /// | `POSTGRES_HOST` | host name, or a socket directory starting with `/` | `localhost` |
    /// | `POSTGRES_PORT` | port | `5432` |
    /// | `POSTGRES_CONNECTION_TIMEOUT` | socket lifetime in milliseconds | `30000` |
    /// | `POSTGRES_MAX_CONNECTIONS` | pool size | `10` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PoolConfig::from_env`] with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| Error::Config(format!("{} is not set", key)))
        };

        let database = required("POSTGRES_DATABASE")?;
        let username = required("POSTGRES_USERNAME")?;
        let password = lookup("POSTGRES_PASSWORD").map_or(Password::Trust, Password::Literal);

        let port = match lookup("POSTGRES_PORT") {
            Some(p) => parse_var("POSTGRES_PORT", &p)?,
            None => 5432,
        };
        let endpoint = match lookup("POSTGRES_HOST") {
            Some(dir) if dir.starts_with('/') => Endpoint::Unix(construct_socket_path(&dir, port)),
            Some(hostname) => Endpoint::Tcp { hostname, port },
            None => Endpoint::Tcp {
                hostname: "localhost".into(),
                port,
            },
        };

        let mut config = Self::new(ClientConfig {
            database,
            username,
            password,
            endpoint,
            connect_timeout: None,
            application_name: None,
        });

        if let Some(ms) = lookup("POSTGRES_CONNECTION_TIMEOUT") {
            config.connection_timeout =
                Duration::from_millis(parse_var("POSTGRES_CONNECTION_TIMEOUT", &ms)?);
        }
        if let Some(max) = lookup("POSTGRES_MAX_CONNECTIONS") {
            config.max_connections = parse_var("POSTGRES_MAX_CONNECTIONS", &max)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that can't produce a working pool
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        if self.max_connections == 0 || self.max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(Error::Config(format!(
                "max_connections must be between 1 and {}, got {}",
                MAX_CONNECTIONS_LIMIT, self.max_connections
            )));
        }
        if self.connection_timeout.is_zero() {
            return Err(Error::Config("connection_timeout must be positive".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid value {:?}", key, value)))
}
