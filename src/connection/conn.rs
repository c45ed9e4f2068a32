//! Core connection type

use super::results::ResultSet;
use super::session::{Completion, Credentials, Session, Statement};
use super::state::ConnectionState;
use super::transport::Transport;
use crate::client::ClientConfig;
use crate::metrics::{counters, histograms, labels};
use crate::protocol::{decode_message, BindValue};
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use std::time::Instant;
use tracing::Instrument;

/// One Postgres socket and the session running over it
///
/// Every operation either resolves with its result or fails the connection:
/// on failure the socket is sent Terminate, shut down, and the session is
/// reset to `Disconnected`, so the caller sees exactly one error per operation.
#[derive(Debug)]
pub struct Connection {
    transport: Option<Transport>,
    session: Session,
    read_buf: BytesMut,
}

impl Connection {
    /// Create an unconnected socket with id `id`
    pub fn new(id: u64, config: &ClientConfig) -> Self {
        Self {
            transport: None,
            session: Session::new(id, Credentials::from(config)),
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    pub fn id(&self) -> u64 {
        self.session.id()
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Whether the named statement was parsed on this socket
    pub fn has_parsed(&self, name: &str) -> bool {
        self.session.has_parsed(name)
    }

    /// Backend process id and secret key, if the server sent them
    pub fn backend_key(&self) -> Option<(i32, i32)> {
        self.session.backend_key()
    }

    /// Open the socket, authenticate, and wait for the first ReadyForQuery
    pub async fn connect(&mut self, config: &ClientConfig) -> Result<()> {
        let id = self.id();
        async {
            if let Err(e) = self.session.begin_connect() {
                return Err(self.abort(e).await);
            }

            let transport = match Transport::connect(&config.endpoint, config.connect_timeout).await
            {
                Ok(transport) => transport,
                Err(e) => return Err(self.abort(e).await),
            };
            self.transport = Some(transport);
            tracing::debug!(endpoint = %config.endpoint, "socket open");

            if let Err(e) = self.session.on_open() {
                return Err(self.abort(e).await);
            }

            match self.run().await? {
                Completion::Connected => {
                    counters::connection_opened();
                    tracing::info!("startup complete");
                    Ok(())
                }
                other => Err(self.unexpected(other).await),
            }
        }
        .instrument(tracing::info_span!(
            "startup",
            socket = id,
            user = %config.username,
            database = %config.database
        ))
        .await
    }

    /// Execute a simple query
    pub async fn query(&mut self, sql: &str) -> Result<ResultSet> {
        let started = Instant::now();
        if let Err(e) = self.session.begin_query(sql) {
            return Err(self.abort(e).await);
        }
        tracing::debug!(socket = self.id(), "query: {}", sql);

        let result = self.results().await;
        record_query(labels::KIND_SIMPLE, started, &result);
        result
    }

    /// Execute a named statement, parsing it first when `statement.query` is set
    pub async fn prepare(
        &mut self,
        statement: Statement<'_>,
        values: Vec<BindValue>,
    ) -> Result<ResultSet> {
        let started = Instant::now();
        if let Err(e) = self.session.begin_prepare(statement, values) {
            return Err(self.abort(e).await);
        }
        tracing::debug!(
            socket = self.id(),
            statement = statement.name,
            parse = statement.query.is_some(),
            "execute prepared"
        );

        let result = self.results().await;
        record_query(labels::KIND_PREPARED, started, &result);
        result
    }

    /// Send Terminate and wait for the server to close the socket
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Err(e) = self.session.begin_disconnect() {
            return Err(self.abort(e).await);
        }

        match self.run().await? {
            Completion::Disconnected => {
                if let Some(mut transport) = self.transport.take() {
                    if let Err(e) = transport.shutdown().await {
                        tracing::debug!(socket = self.id(), error = %e, "shutdown after close");
                    }
                }
                self.read_buf.clear();
                tracing::debug!(socket = self.id(), "disconnected");
                Ok(())
            }
            other => Err(self.unexpected(other).await),
        }
    }

    async fn results(&mut self) -> Result<ResultSet> {
        match self.run().await? {
            Completion::Results(results) => Ok(results),
            other => Err(self.unexpected(other).await),
        }
    }

    async fn unexpected(&mut self, completion: Completion) -> Error {
        let err = Error::Protocol(format!("unexpected completion {:?}", completion));
        self.abort(err).await
    }

    /// Drive the session until the pending operation resolves, failing the connection on error
    async fn run(&mut self) -> Result<Completion> {
        match self.drive().await {
            Ok(done) => Ok(done),
            Err(e) => Err(self.abort(e).await),
        }
    }

    async fn drive(&mut self) -> Result<Completion> {
        loop {
            self.flush().await?;

            while let Some((msg, consumed)) =
                decode_message(&self.read_buf).map_err(|e| Error::Protocol(e.to_string()))?
            {
                self.read_buf.advance(consumed);
                tracing::trace!(socket = self.id(), message = msg.name(), "received");

                if let Some(done) = self.session.handle(msg)? {
                    self.flush().await?;
                    return Ok(done);
                }
            }

            self.flush().await?;

            let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
            let n = transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return self.session.on_closed();
            }
        }
    }

    async fn flush(&mut self) -> Result<()> {
        if !self.session.has_outbox() {
            return Ok(());
        }
        let out = self.session.take_outbox();
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        transport.write_all(&out).await?;
        transport.flush().await?;
        Ok(())
    }

    /// Fail the connection: Terminate, close the socket, reset the session
    async fn abort(&mut self, err: Error) -> Error {
        self.session.fail(err);

        if let Some(mut transport) = self.transport.take() {
            let out = self.session.take_outbox();
            if let Err(e) = transport.write_all(&out).await {
                tracing::debug!(socket = self.id(), error = %e, "terminate not delivered");
            }
            if let Err(e) = transport.shutdown().await {
                tracing::debug!(socket = self.id(), error = %e, "shutdown failed");
            }
            counters::connection_closed(labels::REASON_FAILURE);
        }
        self.read_buf.clear();

        self.session
            .reset()
            .unwrap_or_else(|| Error::Protocol("connection failed without an error".into()))
    }
}

fn record_query(kind: &'static str, started: Instant, result: &Result<ResultSet>) {
    let status = if result.is_ok() {
        labels::STATUS_OK
    } else {
        labels::STATUS_ERROR
    };
    counters::query_completed(kind, status);
    histograms::query_duration(kind, started.elapsed());
}
