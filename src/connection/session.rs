//! Per-connection protocol session
//!
//! `Session` owns everything one socket knows about its conversation with the
//! server: status, the pending operation, SASL progress, the set of statement
//! names already parsed, and the results collected so far. It performs no I/O.
//! Outgoing frames are appended to an outbox that the driver flushes, and
//! every backend frame is fed through [`Session::handle`].

use super::results::ResultSet;
use super::state::ConnectionState;
use crate::auth::{md5_password, SaslState};
use crate::client::{ClientConfig, Password};
use crate::metrics::{counters, histograms, labels};
use crate::protocol::constants::{auth, sasl, PROTOCOL_VERSION};
use crate::protocol::{
    bind_sequence, encode_into, AuthenticationMessage, BackendMessage, BindValue, ErrorFields,
    FrontendMessage,
};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::collections::HashSet;
use std::time::Instant;

/// Identity presented during startup
#[derive(Debug, Clone)]
pub struct Credentials {
    pub database: String,
    pub username: String,
    pub password: Password,
    pub application_name: Option<String>,
}

impl From<&ClientConfig> for Credentials {
    fn from(config: &ClientConfig) -> Self {
        Self {
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            application_name: config.application_name.clone(),
        }
    }
}

/// A prepared-statement execution request
#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    /// Statement name; reused across executions on the same socket
    pub name: &'a str,
    /// SQL text; `None` skips the Parse step
    pub query: Option<&'a str>,
    /// Parameter type OIDs (0 lets the server infer)
    pub param_types: &'a [u32],
}

/// The single outstanding caller-visible operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Connect,
    Query,
    Disconnect,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Query => "query",
            Operation::Disconnect => "disconnect",
        }
    }
}

/// How a pending operation finished
#[derive(Debug)]
pub enum Completion {
    /// Startup finished; the socket is ready for queries
    Connected,
    /// A query finished
    Results(ResultSet),
    /// The server closed the socket after Terminate
    Disconnected,
}

/// Sans-I/O protocol state for one socket
#[derive(Debug)]
pub struct Session {
    id: u64,
    credentials: Credentials,
    state: ConnectionState,
    pending: Option<Operation>,
    first_query: bool,
    parses: HashSet<String>,
    results: ResultSet,
    sasl: SaslState,
    process_id: Option<i32>,
    secret_key: Option<i32>,
    tx_status: Option<u8>,
    failure: Option<Error>,
    outbox: BytesMut,
    auth_mechanism: &'static str,
    auth_started: Option<Instant>,
}

impl Session {
    pub fn new(id: u64, credentials: Credentials) -> Self {
        Self {
            id,
            credentials,
            state: ConnectionState::Disconnected,
            pending: None,
            first_query: true,
            parses: HashSet::new(),
            results: ResultSet::default(),
            sasl: SaslState::Empty,
            process_id: None,
            secret_key: None,
            tx_status: None,
            failure: None,
            outbox: BytesMut::new(),
            auth_mechanism: labels::MECHANISM_TRUST,
            auth_started: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether `name` was parsed on this socket since it connected
    pub fn has_parsed(&self, name: &str) -> bool {
        self.parses.contains(name)
    }

    /// Backend process id and cancel key, once the server sent them
    pub fn backend_key(&self) -> Option<(i32, i32)> {
        Some((self.process_id?, self.secret_key?))
    }

    /// Transaction status byte from the last ReadyForQuery
    pub fn tx_status(&self) -> Option<u8> {
        self.tx_status
    }

    /// Frames waiting to be written
    pub fn take_outbox(&mut self) -> Bytes {
        self.outbox.split().freeze()
    }

    pub fn has_outbox(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Start a connection attempt
    pub fn begin_connect(&mut self) -> Result<()> {
        self.state.expect(ConnectionState::Disconnected)?;
        self.start(Operation::Connect)?;
        self.state.transition(ConnectionState::Connecting)
    }

    /// The socket is open; queue the startup message
    pub fn on_open(&mut self) -> Result<()> {
        self.state.expect(ConnectionState::Connecting)?;

        let mut params = vec![
            ("user".to_string(), self.credentials.username.clone()),
            ("database".to_string(), self.credentials.database.clone()),
        ];
        if let Some(name) = &self.credentials.application_name {
            params.push(("application_name".to_string(), name.clone()));
        }

        self.send(&FrontendMessage::Startup {
            version: PROTOCOL_VERSION,
            params,
        })?;
        self.auth_started = Some(Instant::now());
        self.state.transition(ConnectionState::Authing)
    }

    /// Queue a simple query
    pub fn begin_query(&mut self, sql: &str) -> Result<()> {
        self.state.expect(ConnectionState::ReadyForQuery)?;
        self.start(Operation::Query)?;
        self.send(&FrontendMessage::Query(sql.to_string()))?;
        self.state.transition(ConnectionState::Querying)
    }

    /// Queue Parse (when the statement has query text) and the bind sequence
    pub fn begin_prepare(&mut self, statement: Statement<'_>, values: Vec<BindValue>) -> Result<()> {
        self.state.expect(ConnectionState::ReadyForQuery)?;
        self.start(Operation::Query)?;

        match statement.query {
            Some(query) => {
                self.send(&FrontendMessage::Parse {
                    name: statement.name.to_string(),
                    query: query.to_string(),
                    param_types: statement.param_types.to_vec(),
                })?;
                self.parses.insert(statement.name.to_string());
                self.state.transition(ConnectionState::Parsing)?;
            }
            None => self.state.transition(ConnectionState::ParseComplete)?,
        }

        for msg in bind_sequence(statement.name, values) {
            self.send(&msg)?;
        }
        Ok(())
    }

    /// Queue Terminate; completes when the server closes the socket
    pub fn begin_disconnect(&mut self) -> Result<()> {
        self.state.expect(ConnectionState::ReadyForQuery)?;
        self.start(Operation::Disconnect)?;
        self.send(&FrontendMessage::Terminate)?;
        self.state.transition(ConnectionState::Disconnecting)
    }

    /// The peer closed the socket
    pub fn on_closed(&mut self) -> Result<Completion> {
        if self.state != ConnectionState::Disconnecting {
            return Err(Error::ConnectionClosed);
        }
        self.state.transition(ConnectionState::Disconnected)?;
        self.resolve(Operation::Disconnect)?;
        self.reset();
        Ok(Completion::Disconnected)
    }

    /// Dispatch one backend message
    pub fn handle(&mut self, msg: BackendMessage) -> Result<Option<Completion>> {
        match msg {
            BackendMessage::Authentication(request) => {
                self.on_authentication(request)?;
                Ok(None)
            }
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => {
                self.process_id = Some(process_id);
                self.secret_key = Some(secret_key);
                Ok(None)
            }
            BackendMessage::ParameterStatus { name, value } => {
                tracing::debug!(socket = self.id, "parameter status: {} = {}", name, value);
                Ok(None)
            }
            BackendMessage::ErrorResponse(fields) | BackendMessage::NoticeResponse(fields) => {
                self.on_error_fields(fields)?;
                Ok(None)
            }
            BackendMessage::ParseComplete => {
                self.state.expect(ConnectionState::Parsing)?;
                self.state.transition(ConnectionState::ParseComplete)?;
                Ok(None)
            }
            BackendMessage::BindComplete => {
                self.state.expect(ConnectionState::ParseComplete)?;
                self.state.transition(ConnectionState::Querying)?;
                Ok(None)
            }
            BackendMessage::NoData => Ok(None),
            BackendMessage::RowDescription(fields) => {
                self.state.expect(ConnectionState::Querying)?;
                self.results.describe(&fields)?;
                Ok(None)
            }
            BackendMessage::DataRow(columns) => {
                self.state.expect(ConnectionState::Querying)?;
                self.results.push_row(&columns)?;
                Ok(None)
            }
            BackendMessage::CommandComplete(tag) => {
                self.results.status = tag;
                self.state.expect(ConnectionState::Querying)?;
                self.state.transition(ConnectionState::ReadyForResults)?;
                Ok(None)
            }
            BackendMessage::ReadyForQuery { status } => self.on_ready_for_query(status).map(Some),
        }
    }

    fn on_authentication(&mut self, request: AuthenticationMessage) -> Result<()> {
        self.state.expect(ConnectionState::Authing)?;

        if let AuthenticationMessage::Ok = request {
            self.sasl_step(|sasl| sasl.ensure_complete())?;
            if let Some(started) = self.auth_started.take() {
                histograms::auth_duration(self.auth_mechanism, started.elapsed());
            }
            counters::auth_successful(self.auth_mechanism);
            tracing::debug!(socket = self.id, mechanism = self.auth_mechanism, "authenticated");
            return self.state.transition(ConnectionState::Connected);
        }

        let password = match &self.credentials.password {
            Password::Literal(password) => password.clone(),
            other => {
                counters::auth_failed(self.auth_mechanism, "no_password");
                return Err(Error::Authentication(format!(
                    "server requested {} authentication but the client is configured for {}",
                    auth::name(request.code()),
                    other.name()
                )));
            }
        };

        match request {
            AuthenticationMessage::Ok => Ok(()),
            AuthenticationMessage::CleartextPassword => {
                self.begin_auth(labels::MECHANISM_CLEARTEXT);
                self.send(&FrontendMessage::Password(password))
            }
            AuthenticationMessage::Md5Password { salt } => {
                self.begin_auth(labels::MECHANISM_MD5);
                let hashed = md5_password(&self.credentials.username, &password, &salt);
                self.send(&FrontendMessage::Password(hashed))
            }
            AuthenticationMessage::Sasl { mechanisms } => {
                self.begin_auth(labels::MECHANISM_SCRAM);
                let first = self.sasl_step(|sasl| sasl.start(&mechanisms, &password))?;
                self.send(&FrontendMessage::SaslInitialResponse {
                    mechanism: sasl::SCRAM_SHA_256.to_string(),
                    data: first.into_bytes(),
                })
            }
            AuthenticationMessage::SaslContinue { data } => {
                let client_final = self.sasl_step(|sasl| sasl.challenge(&data))?;
                self.send(&FrontendMessage::SaslResponse {
                    data: client_final.into_bytes(),
                })
            }
            AuthenticationMessage::SaslFinal { data } => {
                self.sasl_step(|sasl| sasl.finish(&data))?;
                tracing::debug!(socket = self.id, "server signature verified");
                Ok(())
            }
            AuthenticationMessage::Unsupported(code) => {
                counters::auth_failed(self.auth_mechanism, "unsupported");
                Err(Error::Authentication(format!(
                    "authentication code {} ({}) is not supported",
                    code,
                    auth::name(code)
                )))
            }
        }
    }

    fn begin_auth(&mut self, mechanism: &'static str) {
        self.auth_mechanism = mechanism;
        counters::auth_attempted(mechanism);
    }

    fn sasl_step<T>(
        &mut self,
        step: impl FnOnce(&mut SaslState) -> std::result::Result<T, crate::auth::ScramError>,
    ) -> Result<T> {
        step(&mut self.sasl).map_err(|e| {
            counters::auth_failed(labels::MECHANISM_SCRAM, "sasl");
            Error::Sasl(e)
        })
    }

    fn on_error_fields(&mut self, fields: ErrorFields) -> Result<()> {
        let severity = fields
            .vseverity
            .clone()
            .or_else(|| fields.severity.clone())
            .unwrap_or_default();
        match severity.as_str() {
            "ERROR" | "FATAL" | "PANIC" => {
                if self.state == ConnectionState::Authing {
                    counters::auth_failed(self.auth_mechanism, "server_error");
                }
                Err(Error::Server(fields.into_server_error()))
            }
            "WARNING" => {
                tracing::warn!(socket = self.id, "{}", fields);
                Ok(())
            }
            "NOTICE" | "INFO" | "LOG" => {
                tracing::info!(socket = self.id, "{}", fields);
                Ok(())
            }
            "DEBUG" => {
                tracing::debug!(socket = self.id, "{}", fields);
                Ok(())
            }
            other => Err(Error::Protocol(format!(
                "unrecognized severity {:?}: {}",
                other, fields
            ))),
        }
    }

    fn on_ready_for_query(&mut self, status: u8) -> Result<Completion> {
        self.tx_status = Some(status);

        if self.first_query {
            self.state.expect(ConnectionState::Connected)?;
            self.resolve(Operation::Connect)?;
            self.state.transition(ConnectionState::ReadyForQuery)?;
            self.first_query = false;
            return Ok(Completion::Connected);
        }

        self.state.expect(ConnectionState::ReadyForResults)?;
        self.resolve(Operation::Query)?;
        self.state.transition(ConnectionState::ReadyForQuery)?;
        Ok(Completion::Results(self.results.take()))
    }

    /// Record a failure; the first one wins. Queues Terminate for the driver.
    pub fn fail(&mut self, err: Error) {
        if self.state.is_failed() {
            tracing::debug!(socket = self.id, error = %err, "ignoring error after failure");
            return;
        }

        tracing::error!(socket = self.id, status = %self.state, error = %err, "connection failed");
        let next = match err {
            Error::Io(_) | Error::ConnectionClosed => ConnectionState::InternalError,
            _ => ConnectionState::Error,
        };
        // Any state may fail
        let _ = self.state.transition(next);
        self.failure = Some(err);
        self.outbox.clear();
        if let Err(e) = encode_into(&mut self.outbox, &FrontendMessage::Terminate) {
            tracing::debug!(socket = self.id, error = %e, "could not queue terminate");
        }
    }

    /// Take the recorded failure (if any) and return to a fresh disconnected session
    pub fn reset(&mut self) -> Option<Error> {
        let failure = self.failure.take();
        *self = Session::new(self.id, self.credentials.clone());
        failure
    }

    fn start(&mut self, op: Operation) -> Result<()> {
        if let Some(pending) = self.pending {
            return Err(Error::Protocol(format!(
                "{} requested while {} is still pending",
                op.name(),
                pending.name()
            )));
        }
        self.pending = Some(op);
        Ok(())
    }

    fn resolve(&mut self, op: Operation) -> Result<()> {
        match self.pending.take() {
            Some(pending) if pending == op => Ok(()),
            Some(pending) => Err(Error::Protocol(format!(
                "{} finished while {} was pending",
                op.name(),
                pending.name()
            ))),
            None => Err(Error::Protocol(format!(
                "{} finished with no pending operation",
                op.name()
            ))),
        }
    }

    fn send(&mut self, msg: &FrontendMessage) -> Result<()> {
        encode_into(&mut self.outbox, msg)?;
        Ok(())
    }
}
