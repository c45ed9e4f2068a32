//! Pool lifecycle: socket acquisition, idle timers, disconnects

use super::config::PoolConfig;
use super::params::substitute_params;
use super::prepare::{bind_values, PrepareOptions, Prepared};
use crate::connection::{Connection, ConnectionState, ResultSet, Statement};
use crate::error::PoolError;
use crate::metrics::{counters, labels};
use crate::query::{is_identifier, TableQuery};
use crate::value::{Row, Value};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

const TABLE_NAMES_STATEMENT: &str = "select-table-names";
const TABLE_NAMES_SQL: &str =
    "SELECT table_name FROM information_schema.tables WHERE table_schema='public';";

type Socket = Arc<AsyncMutex<Connection>>;
type SocketGuard = OwnedMutexGuard<Connection>;

/// Rows returned by a pool query, tagged with the socket that ran it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResults {
    /// Socket the query ran on
    pub socket_id: u64,
    /// SQL text as sent (after `$n` substitution for simple queries)
    pub query: String,
    /// Decoded rows
    pub rows: Vec<Row>,
    /// Command tag
    pub status: String,
}

/// Outcome of a non-forced disconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisconnectStatus {
    /// The socket was closed and removed
    Ok,
    /// No socket has this id
    NoSocketExists,
    /// The socket is mid-operation; nothing was done
    NotReady,
}

enum Closed {
    Done,
    Missing,
    Busy(String),
}

/// Exclusive use of one pooled socket
///
/// Dropping a lease whose connection is not back in `ReadyForQuery` removes
/// the socket from the pool before the lock is released. This covers failed
/// operations as well as callers that drop a query future mid-flight.
struct Lease {
    pool: Pool,
    id: u64,
    guard: SocketGuard,
}

impl Deref for Lease {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.guard
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.guard
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let state = self.guard.state();
        if state != ConnectionState::ReadyForQuery {
            tracing::debug!(socket = self.id, %state, "socket removed from pool");
            self.pool.delete(self.id);
        }
    }
}

/// A bounded set of sockets sharing one configuration
///
/// Cloning is cheap; clones share the same sockets. Each socket runs at most
/// one operation at a time. A socket lives until its connection timeout
/// elapses while it is idle, an operation on it fails, or it is disconnected
/// explicitly.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
}

/// Sockets and their timers, always mutated together
#[derive(Default)]
struct PoolState {
    sockets: BTreeMap<u64, Socket>,
    timeouts: HashMap<u64, JoinHandle<()>>,
    connections: u64,
}

impl PoolState {
    /// First idle socket among the first `max`; `None` means a new socket may be opened
    fn next_ready(&self, max: u32) -> Result<Option<(u64, SocketGuard)>> {
        for (id, socket) in self.sockets.iter().take(max as usize) {
            let Ok(guard) = socket.clone().try_lock_owned() else {
                continue;
            };
            if guard.state() == ConnectionState::ReadyForQuery {
                return Ok(Some((*id, guard)));
            }
        }

        if self.sockets.len() < max as usize {
            Ok(None)
        } else {
            Err(PoolError::Exhausted { max }.into())
        }
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        for (_, timer) in self.state.get_mut().timeouts.drain() {
            timer.abort();
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("sockets", &self.socket_ids())
            .finish()
    }
}

impl Pool {
    /// Create an empty pool; sockets open on demand
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState::default()),
            }),
        })
    }

    /// Create a pool from `POSTGRES_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(PoolConfig::from_env()?)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Ids of the sockets currently tracked, in ascending order
    pub fn socket_ids(&self) -> Vec<u64> {
        self.inner.state.lock().sockets.keys().copied().collect()
    }

    pub fn socket_count(&self) -> usize {
        self.inner.state.lock().sockets.len()
    }

    /// Status of one socket; `"busy"` while an operation holds it
    pub fn socket_state(&self, id: u64) -> Option<String> {
        let socket = self.inner.state.lock().sockets.get(&id).cloned()?;
        let state = match socket.try_lock_owned() {
            Ok(guard) => guard.state().to_string(),
            Err(_) => "busy".to_string(),
        };
        Some(state)
    }

    /// Run a simple query, substituting `$n` placeholders with literals
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResults> {
        let text = if params.is_empty() {
            sql.to_string()
        } else {
            substitute_params(sql, params)?
        };

        let mut lease = self.acquire().await?;
        let result = lease.query(&text).await;
        finish(lease, text, result)
    }

    /// Run a built table query as a simple query
    pub async fn execute(&self, query: TableQuery) -> Result<QueryResults> {
        let (sql, params) = query.into_parts();
        self.query(&sql, &params).await
    }

    /// Start a table query
    pub fn table(&self, name: impl Into<String>) -> TableQuery {
        TableQuery::new(name)
    }

    /// Prepared-statement handle for `options`
    pub fn prepare(&self, options: impl Into<PrepareOptions>) -> Prepared {
        Prepared::new(self.clone(), options.into())
    }

    pub(crate) async fn run_prepared(
        &self,
        options: &PrepareOptions,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResults> {
        let values = bind_values(options.values.as_deref().unwrap_or(params));

        let mut lease = self.acquire().await?;
        let query = (!lease.has_parsed(&options.name)).then_some(sql);
        let statement = Statement {
            name: &options.name,
            query,
            param_types: &options.types,
        };
        let result = lease.prepare(statement, values).await;
        finish(lease, sql.to_string(), result)
    }

    /// Names of the tables in the `public` schema
    pub async fn list_table_names(&self) -> Result<Vec<String>> {
        let results = self
            .prepare(TABLE_NAMES_STATEMENT)
            .query(TABLE_NAMES_SQL, &[])
            .await?;

        Ok(results
            .rows
            .iter()
            .filter_map(|row| row.get("table_name")?.as_str().map(str::to_string))
            .collect())
    }

    /// Every row of `table`
    pub async fn fetch_table_rows(&self, table: &str) -> Result<Vec<Row>> {
        if !is_identifier(table) {
            return Err(Error::Config(format!("invalid table name {:?}", table)));
        }

        let query = TableQuery::new(table).select(&[]).filter(&[]);
        let results = self
            .prepare(format!("select-table-{}", table))
            .execute(query)
            .await?;
        Ok(results.rows)
    }

    /// Close socket `id` if it is idle
    pub async fn disconnect(&self, id: u64) -> Result<DisconnectStatus> {
        Ok(match self.close_socket(id, labels::REASON_REQUESTED).await? {
            Closed::Done => DisconnectStatus::Ok,
            Closed::Missing => DisconnectStatus::NoSocketExists,
            Closed::Busy(_) => DisconnectStatus::NotReady,
        })
    }

    /// Close socket `id`, failing if it doesn't exist or is mid-operation
    pub async fn force_disconnect(&self, id: u64) -> Result<()> {
        match self.close_socket(id, labels::REASON_REQUESTED).await? {
            Closed::Done => Ok(()),
            Closed::Missing => Err(PoolError::NoSocket(id).into()),
            Closed::Busy(status) => Err(PoolError::NotReady { id, status }.into()),
        }
    }

    /// Close every idle socket; busy sockets are left to their timers
    pub async fn disconnect_pool(&self) -> Result<()> {
        for id in self.socket_ids() {
            let status = self.disconnect(id).await?;
            tracing::debug!(socket = id, ?status, "disconnect_pool");
        }
        Ok(())
    }

    /// Lock an idle socket, opening a new one when there is room
    async fn acquire(&self) -> Result<Lease> {
        let (id, guard, fresh) = {
            let mut state = self.inner.state.lock();
            match state.next_ready(self.inner.config.max_connections)? {
                Some((id, guard)) => (id, guard, false),
                None => {
                    state.connections += 1;
                    let id = state.connections;
                    let socket: Socket = Arc::new(AsyncMutex::new(Connection::new(
                        id,
                        &self.inner.config.client,
                    )));
                    let guard = socket.clone().try_lock_owned().map_err(|_| {
                        Error::Protocol(format!("new socket {} is already locked", id))
                    })?;

                    let timer = spawn_idle_timer(
                        Arc::downgrade(&self.inner),
                        id,
                        self.inner.config.connection_timeout,
                    );
                    state.sockets.insert(id, socket);
                    state.timeouts.insert(id, timer);
                    (id, guard, true)
                }
            }
        };

        let mut lease = Lease {
            pool: self.clone(),
            id,
            guard,
        };
        if fresh {
            // A failed or abandoned startup leaves the lease in a non-ready state
            lease.connect(&self.inner.config.client).await?;
            tracing::info!(socket = id, "socket connected");
        }
        Ok(lease)
    }

    async fn close_socket(&self, id: u64, reason: &'static str) -> Result<Closed> {
        let socket = self.inner.state.lock().sockets.get(&id).cloned();
        let Some(socket) = socket else {
            return Ok(Closed::Missing);
        };
        let Ok(guard) = socket.try_lock_owned() else {
            return Ok(Closed::Busy("busy".into()));
        };
        let state = guard.state();
        if state != ConnectionState::ReadyForQuery {
            return Ok(Closed::Busy(state.to_string()));
        }

        let mut lease = Lease {
            pool: self.clone(),
            id,
            guard,
        };
        let result = lease.disconnect().await;
        drop(lease);
        result?;

        counters::connection_closed(reason);
        tracing::info!(socket = id, reason, "socket disconnected");
        Ok(Closed::Done)
    }

    /// Forget a socket and cancel its timer
    fn delete(&self, id: u64) {
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.timeouts.remove(&id) {
            timer.abort();
        }
        state.sockets.remove(&id);
    }
}

/// Package the outcome of one socket operation; a failed socket leaves with the lease
fn finish(lease: Lease, query: String, result: Result<ResultSet>) -> Result<QueryResults> {
    let socket_id = lease.id;
    drop(lease);
    let results = result?;
    Ok(QueryResults {
        socket_id,
        query,
        rows: results.rows,
        status: results.status,
    })
}

/// Close socket `id` once it has been alive for `timeout`, retrying while it is busy
fn spawn_idle_timer(pool: Weak<PoolInner>, id: u64, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(timeout).await;
            let Some(inner) = pool.upgrade() else {
                return;
            };
            let pool = Pool { inner };

            match pool.close_socket(id, labels::REASON_IDLE).await {
                Ok(Closed::Busy(status)) => {
                    counters::idle_rescheduled();
                    tracing::debug!(socket = id, %status, "socket busy, timer re-armed");
                }
                Ok(Closed::Done) | Ok(Closed::Missing) => return,
                Err(e) => {
                    tracing::error!(socket = id, error = %e, "idle disconnect failed");
                    return;
                }
            }
        }
    })
}
