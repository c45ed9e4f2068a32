//! Pooled Postgres client speaking the v3 wire protocol
//!
//! * Wire codec for the startup, simple-query and extended-query subsets
//! * Clear-text, MD5 and SCRAM-SHA-256 authentication
//! * A strict per-socket state machine with one pending operation at a time
//! * A bounded pool with idle timeouts and prepared-statement reuse
//!
//! ```no_run
//! # async fn example() -> pgwire_pool::Result<()> {
//! use pgwire_pool::{ClientConfig, Pool, PoolConfig, Value};
//!
//! let client = ClientConfig::builder("todo", "postgres")
//!     .password("secret")
//!     .build()?;
//! let pool = Pool::new(PoolConfig::new(client).max_connections(4))?;
//!
//! pool.query("INSERT INTO todos (id, name) VALUES ($1, $2);", &[Value::from(10), "milk".into()])
//!     .await?;
//! let results = pool
//!     .prepare("get-todo")
//!     .query("SELECT * FROM todos WHERE id = $1;", &[Value::from(10)])
//!     .await?;
//! println!("{}", serde_json::to_string(&results.rows).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod protocol;
pub mod query;
pub mod value;

pub use client::{Client, ClientConfig, Endpoint, Password};
pub use connection::{ConnectionState, ResultSet};
pub use error::{Error, PoolError, Result, ServerError};
pub use pool::{DisconnectStatus, Pool, PoolConfig, PrepareOptions, Prepared, QueryResults};
pub use query::{Filter, Join, JoinKind, TableQuery};
pub use value::{ResultType, Row, Value};
