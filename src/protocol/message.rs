//! Protocol message types

use crate::error::ServerError;
use bytes::Bytes;

/// Frontend message (client → server)
#[derive(Debug, Clone, PartialEq)]
pub enum FrontendMessage {
    /// Startup message
    Startup {
        /// Protocol version
        version: i32,
        /// Connection parameters
        params: Vec<(String, String)>,
    },

    /// Password message (clear-text password or md5 hash string)
    Password(String),

    /// SASL initial response message
    SaslInitialResponse {
        /// SASL mechanism name (e.g., "SCRAM-SHA-256")
        mechanism: String,
        /// SASL client first message data
        data: Vec<u8>,
    },

    /// SASL response message
    SaslResponse {
        /// SASL client final message data
        data: Vec<u8>,
    },

    /// Parse (create a named prepared statement)
    Parse {
        /// Statement name
        name: String,
        /// Query text
        query: String,
        /// Parameter type OIDs (may be empty to let the server infer)
        param_types: Vec<u32>,
    },

    /// Bind parameters to a statement into the unnamed portal
    Bind {
        /// Statement name
        statement: String,
        /// Parameter values
        values: Vec<BindValue>,
    },

    /// Describe a portal or statement
    Describe {
        /// `describe::PORTAL` or `describe::STATEMENT`
        kind: u8,
        /// Portal or statement name (empty for unnamed)
        name: String,
    },

    /// Execute a portal
    Execute {
        /// Portal name (empty for unnamed)
        portal: String,
        /// Row limit (0 = no limit)
        max_rows: i32,
    },

    /// Sync
    Sync,

    /// Simple query message
    Query(String),

    /// Terminate message
    Terminate,
}

/// A single Bind parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    /// SQL NULL (length -1)
    Null,
    /// Text-format value
    Text(String),
    /// Binary-format value
    Binary(Vec<u8>),
}

impl BindValue {
    /// Format code this value is sent with
    pub fn format(&self) -> i16 {
        match self {
            BindValue::Binary(_) => super::constants::format::BINARY,
            BindValue::Null | BindValue::Text(_) => super::constants::format::TEXT,
        }
    }

    /// Raw bytes of the value, `None` for NULL
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BindValue::Null => None,
            BindValue::Text(s) => Some(s.as_bytes()),
            BindValue::Binary(b) => Some(b),
        }
    }
}

/// Backend message (server → client)
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Authentication request
    Authentication(AuthenticationMessage),

    /// Backend key data (for cancellation)
    BackendKeyData {
        /// Process ID
        process_id: i32,
        /// Secret key
        secret_key: i32,
    },

    /// Bind complete
    BindComplete,

    /// Command complete
    CommandComplete(String),

    /// Data row
    DataRow(Vec<Option<Bytes>>),

    /// Error response
    ErrorResponse(ErrorFields),

    /// No data
    NoData,

    /// Notice response
    NoticeResponse(ErrorFields),

    /// Parameter status
    ParameterStatus {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },

    /// Parse complete
    ParseComplete,

    /// Ready for query
    ReadyForQuery {
        /// Transaction status
        status: u8,
    },

    /// Row description
    RowDescription(Vec<FieldDescription>),
}

impl BackendMessage {
    /// Short name used in logs and protocol errors
    pub fn name(&self) -> &'static str {
        match self {
            BackendMessage::Authentication(_) => "Authentication",
            BackendMessage::BackendKeyData { .. } => "BackendKeyData",
            BackendMessage::BindComplete => "BindComplete",
            BackendMessage::CommandComplete(_) => "CommandComplete",
            BackendMessage::DataRow(_) => "DataRow",
            BackendMessage::ErrorResponse(_) => "ErrorResponse",
            BackendMessage::NoData => "NoData",
            BackendMessage::NoticeResponse(_) => "NoticeResponse",
            BackendMessage::ParameterStatus { .. } => "ParameterStatus",
            BackendMessage::ParseComplete => "ParseComplete",
            BackendMessage::ReadyForQuery { .. } => "ReadyForQuery",
            BackendMessage::RowDescription(_) => "RowDescription",
        }
    }
}

/// Authentication message types
#[derive(Debug, Clone)]
pub enum AuthenticationMessage {
    /// Authentication OK
    Ok,

    /// Cleartext password required
    CleartextPassword,

    /// MD5 password required
    Md5Password {
        /// Salt for MD5 hash
        salt: [u8; 4],
    },

    /// SASL authentication mechanisms available (Postgres 10+)
    Sasl {
        /// List of SASL mechanism names (e.g., ["SCRAM-SHA-256"])
        mechanisms: Vec<String>,
    },

    /// SASL continuation message (server challenge)
    SaslContinue {
        /// SASL server first message data
        data: Vec<u8>,
    },

    /// SASL final message (server verification)
    SaslFinal {
        /// SASL server final message data
        data: Vec<u8>,
    },

    /// Any other authentication code (Kerberos, GSS, SSPI, ...)
    Unsupported(i32),
}

impl AuthenticationMessage {
    /// Wire code of this request
    pub fn code(&self) -> i32 {
        use super::constants::auth;
        match self {
            AuthenticationMessage::Ok => auth::OK,
            AuthenticationMessage::CleartextPassword => auth::CLEARTEXT_PASSWORD,
            AuthenticationMessage::Md5Password { .. } => auth::MD5_PASSWORD,
            AuthenticationMessage::Sasl { .. } => auth::SASL,
            AuthenticationMessage::SaslContinue { .. } => auth::SASL_CONTINUE,
            AuthenticationMessage::SaslFinal { .. } => auth::SASL_FINAL,
            AuthenticationMessage::Unsupported(code) => *code,
        }
    }
}

/// Field description (column metadata)
#[derive(Debug, Clone)]
pub struct FieldDescription {
    /// Column name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: i32,
    /// Column attribute number (0 if not a table column)
    pub column_attr: i16,
    /// Data type OID
    pub type_oid: u32,
    /// Data type size
    pub type_size: i16,
    /// Type modifier
    pub type_modifier: i32,
    /// Format code (0 = text, 1 = binary)
    pub format_code: i16,
}

/// Error/notice fields
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    /// Severity (ERROR, WARNING, etc.)
    pub severity: Option<String>,
    /// Non-localized severity
    pub vseverity: Option<String>,
    /// SQLSTATE code
    pub code: Option<String>,
    /// Human-readable message
    pub message: Option<String>,
    /// Additional detail
    pub detail: Option<String>,
    /// Hint
    pub hint: Option<String>,
    /// Position in query string
    pub position: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source file
    pub file: Option<String>,
    /// Source line
    pub line: Option<String>,
    /// Source routine
    pub routine: Option<String>,
}

impl ErrorFields {
    /// Convert into the structured error surfaced to callers
    pub fn into_server_error(self) -> ServerError {
        ServerError {
            severity: self.severity.unwrap_or_default(),
            vseverity: self.vseverity,
            code: self.code.unwrap_or_default(),
            message: self.message.unwrap_or_default(),
            detail: self.detail,
            hint: self.hint,
            position: self.position,
            schema: self.schema,
            table: self.table,
            constraint: self.constraint,
            file: self.file,
            line: self.line,
            routine: self.routine,
        }
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref severity) = self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(ref msg) = self.message {
            write!(f, "{}", msg)?;
        }
        if let Some(ref code) = self.code {
            write!(f, " ({})", code)?;
        }
        Ok(())
    }
}
