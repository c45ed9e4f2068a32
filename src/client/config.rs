//! Client configuration

use crate::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Credential presented to the server
#[derive(Clone, PartialEq, Eq)]
pub enum Password {
    /// A real password, used for clear-text, MD5 and SCRAM-SHA-256
    Literal(String),
    /// Rely on `peer` authentication (Unix sockets only)
    Peer,
    /// Rely on `trust` authentication
    Trust,
}

impl Password {
    /// Name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Password::Literal(_) => "PASSWORD",
            Password::Peer => "PEER",
            Password::Trust => "TRUST",
        }
    }

    /// The password text, if this is not one of the no-password methods
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Password::Literal(p) => Some(p),
            Password::Peer | Password::Trust => None,
        }
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Password::Literal(_) => f.write_str("Literal(<redacted>)"),
            Password::Peer => f.write_str("Peer"),
            Password::Trust => f.write_str("Trust"),
        }
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Password::Literal(s.to_string())
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Password::Literal(s)
    }
}

/// Where the server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port
    Tcp {
        /// Host name or address
        hostname: String,
        /// Port
        port: u16,
    },
    /// Full path of a Unix socket (e.g. `/run/postgresql/.s.PGSQL.5432`)
    Unix(PathBuf),
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Tcp {
            hostname: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { hostname, port } => write!(f, "{}:{}", hostname, port),
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Connection parameters for a single client or for every socket of a pool
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Database name
    pub database: String,
    /// Username
    pub username: String,
    /// Password or no-password method
    pub password: Password,
    /// Server address
    pub endpoint: Endpoint,
    /// Limit on opening the socket (default: none)
    pub connect_timeout: Option<Duration>,
    /// Application name for Postgres logs
    pub application_name: Option<String>,
}

impl ClientConfig {
    /// Create a builder
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ClientConfig::builder("todo", "postgres")
    ///     .password("secret")
    ///     .tcp("localhost", 5432)
    ///     .build()?;
    /// ```
    pub fn builder(
        database: impl Into<String>,
        username: impl Into<String>,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: ClientConfig {
                database: database.into(),
                username: username.into(),
                password: Password::Trust,
                endpoint: Endpoint::default(),
                connect_timeout: None,
                application_name: None,
            },
        }
    }

    /// Reject values that can never produce a working connection
    pub fn validate(&self) -> Result<()> {
        non_empty("database", &self.database)?;
        non_empty("username", &self.username)?;
        if let Password::Literal(p) = &self.password {
            non_empty("password", p)?;
        }
        if let Some(name) = &self.application_name {
            non_empty("application_name", name)?;
        }

        match &self.endpoint {
            Endpoint::Tcp { hostname, .. } => non_empty("hostname", hostname)?,
            Endpoint::Unix(path) => {
                if path.as_os_str().is_empty() {
                    return Err(Error::Config("unix socket path can't be empty".into()));
                }
                if self.password == Password::Peer {
                    let os_user = whoami::username();
                    if os_user != self.username {
                        return Err(Error::Config(format!(
                            "peer authentication requires the OS user ({}) to match username {}",
                            os_user, self.username
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn non_empty(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Config(format!("{} can't be an empty string", what)));
    }
    Ok(())
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set a literal password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Password::Literal(password.into());
        self
    }

    /// Use peer authentication
    pub fn peer(mut self) -> Self {
        self.config.password = Password::Peer;
        self
    }

    /// Use trust authentication (the default)
    pub fn trust(mut self) -> Self {
        self.config.password = Password::Trust;
        self
    }

    /// Connect over TCP (the default is `localhost:5432`)
    pub fn tcp(mut self, hostname: impl Into<String>, port: u16) -> Self {
        self.config.endpoint = Endpoint::Tcp {
            hostname: hostname.into(),
            port,
        };
        self
    }

    /// Connect over a Unix socket at `path`
    pub fn unix(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.endpoint = Endpoint::Unix(path.into());
        self
    }

    /// Set socket connect timeout
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.config.connect_timeout = Some(duration);
        self
    }

    /// Set application name for Postgres logs
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = Some(name.into());
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
