//! Connection string parsing
//!
//! Supports formats:
//! * postgres://[user[:password]@][host][:port][/database][?params]
//! * postgres:///database (Unix socket, local)
//! * postgres:///database?host=/path/to/socket (Unix socket, custom directory)
//!
//! Recognized query parameters: `host` and `port` (Unix only), `application_name`,
//! and `connect_timeout` (seconds).

use super::config::{ClientConfig, Endpoint, Password};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parsed connection info
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    /// Where to connect
    pub endpoint: Endpoint,
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password; absent means trust authentication
    pub password: Option<String>,
    /// Application name for Postgres logs
    pub application_name: Option<String>,
    /// Socket connect timeout
    pub connect_timeout: Option<Duration>,
}

/// Resolve the default Unix socket directory
fn resolve_default_socket_dir() -> Option<String> {
    for dir in &["/run/postgresql", "/var/run/postgresql", "/tmp"] {
        if Path::new(dir).is_dir() {
            return Some(dir.to_string());
        }
    }
    None
}

/// Extract a query parameter value from a query string
fn parse_query_param(query_string: &str, param: &str) -> Option<String> {
    let query = query_string.trim_start_matches('?');
    if query.is_empty() {
        return None;
    }

    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == param).then(|| value.to_string())
    })
}

/// Construct the full Unix socket path
pub(crate) fn construct_socket_path(socket_dir: &str, port: u16) -> PathBuf {
    PathBuf::from(format!("{}/.s.PGSQL.{}", socket_dir, port))
}

fn parse_port(s: &str) -> Result<u16> {
    s.parse()
        .map_err(|_| Error::Config(format!("invalid port {:?}", s)))
}

fn parse_connect_timeout(query_string: &str) -> Result<Option<Duration>> {
    parse_query_param(query_string, "connect_timeout")
        .map(|s| {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| Error::Config(format!("invalid connect_timeout {:?}", s)))
        })
        .transpose()
}

impl ConnectionInfo {
    /// Parse connection string
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("postgres://")
            .or_else(|| s.strip_prefix("postgresql://"))
            .ok_or_else(|| {
                Error::Config("connection string must start with postgres://".into())
            })?;

        if rest.starts_with('/') {
            return Self::parse_unix(rest);
        }

        Self::parse_tcp(rest)
    }

    fn parse_unix(rest: &str) -> Result<Self> {
        let (path, query_string) = rest.split_at(rest.find('?').unwrap_or(rest.len()));

        let path = path.trim_start_matches('/');
        let database = if path.is_empty() {
            whoami::username()
        } else {
            path.to_string()
        };

        let port = match parse_query_param(query_string, "port") {
            Some(p) => parse_port(&p)?,
            None => 5432,
        };

        let socket_dir = match parse_query_param(query_string, "host") {
            Some(dir) => dir,
            None => resolve_default_socket_dir().ok_or_else(|| {
                Error::Config(
                    "could not locate Unix socket directory. Set host query parameter explicitly."
                        .into(),
                )
            })?,
        };

        Ok(Self {
            endpoint: Endpoint::Unix(construct_socket_path(&socket_dir, port)),
            database,
            user: whoami::username(),
            password: None,
            application_name: parse_query_param(query_string, "application_name"),
            connect_timeout: parse_connect_timeout(query_string)?,
        })
    }

    fn parse_tcp(rest: &str) -> Result<Self> {
        let (auth, rest) = match rest.split_once('@') {
            Some((auth, rest)) => (Some(auth), rest),
            None => (None, rest),
        };

        let (user, password) = match auth {
            Some(auth) => match auth.split_once(':') {
                Some((user, pass)) => (user.to_string(), Some(pass.to_string())),
                None => (auth.to_string(), None),
            },
            None => (whoami::username(), None),
        };

        let (rest, query_string) = rest.split_at(rest.find('?').unwrap_or(rest.len()));

        let (host_port, database) = match rest.split_once('/') {
            Some((hp, db)) => (hp, db.to_string()),
            None => (rest, whoami::username()),
        };

        let (hostname, port) = match host_port.split_once(':') {
            Some((host, port)) => (host.to_string(), parse_port(port)?),
            None => (host_port.to_string(), 5432),
        };

        Ok(Self {
            endpoint: Endpoint::Tcp { hostname, port },
            database,
            user,
            password,
            application_name: parse_query_param(query_string, "application_name"),
            connect_timeout: parse_connect_timeout(query_string)?,
        })
    }

    /// Convert to a validated [`ClientConfig`]
    pub fn to_config(&self) -> Result<ClientConfig> {
        let config = ClientConfig {
            database: self.database.clone(),
            username: self.user.clone(),
            password: self
                .password
                .clone()
                .map_or(Password::Trust, Password::Literal),
            endpoint: self.endpoint.clone(),
            connect_timeout: self.connect_timeout,
            application_name: self.application_name.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

impl std::str::FromStr for ClientConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ConnectionInfo::parse(s)?.to_config()
    }
}
