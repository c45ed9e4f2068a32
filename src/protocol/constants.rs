//! Postgres protocol constants

/// Protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 0x0003_0000;

/// Longest statement name the server keeps without truncation (NAMEDATALEN - 1)
pub const MAX_STATEMENT_NAME_LEN: usize = 63;

/// Backend message type tags
pub mod tags {
    /// Authentication request
    pub const AUTHENTICATION: u8 = b'R';

    /// Backend key data
    pub const BACKEND_KEY_DATA: u8 = b'K';

    /// Bind complete
    pub const BIND_COMPLETE: u8 = b'2';

    /// Command complete
    pub const COMMAND_COMPLETE: u8 = b'C';

    /// Data row
    pub const DATA_ROW: u8 = b'D';

    /// Error response
    pub const ERROR_RESPONSE: u8 = b'E';

    /// No data (describe of a statement that returns no rows)
    pub const NO_DATA: u8 = b'n';

    /// Notice response
    pub const NOTICE_RESPONSE: u8 = b'N';

    /// Parameter status
    pub const PARAMETER_STATUS: u8 = b'S';

    /// Parse complete
    pub const PARSE_COMPLETE: u8 = b'1';

    /// Ready for query
    pub const READY_FOR_QUERY: u8 = b'Z';

    /// Row description
    pub const ROW_DESCRIPTION: u8 = b'T';
}

/// Frontend message type tags
pub mod frontend {
    /// Password, SASLInitialResponse and SASLResponse share this tag
    pub const PASSWORD: u8 = b'p';

    /// Parse
    pub const PARSE: u8 = b'P';

    /// Bind
    pub const BIND: u8 = b'B';

    /// Describe
    pub const DESCRIBE: u8 = b'D';

    /// Execute
    pub const EXECUTE: u8 = b'E';

    /// Sync
    pub const SYNC: u8 = b'S';

    /// Simple query
    pub const QUERY: u8 = b'Q';

    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

/// Describe targets
pub mod describe {
    /// Prepared statement
    pub const STATEMENT: u8 = b'S';

    /// Portal
    pub const PORTAL: u8 = b'P';
}

/// Parameter and result format codes
pub mod format {
    /// Text format
    pub const TEXT: i16 = 0;

    /// Binary format
    pub const BINARY: i16 = 1;
}

/// Authentication request codes
pub mod auth {
    /// Authentication successful
    pub const OK: i32 = 0;

    /// Cleartext password required
    pub const CLEARTEXT_PASSWORD: i32 = 3;

    /// MD5 password required
    pub const MD5_PASSWORD: i32 = 5;

    /// SASL mechanisms available (Postgres 10+)
    pub const SASL: i32 = 10;

    /// SASL server challenge
    pub const SASL_CONTINUE: i32 = 11;

    /// SASL server final message
    pub const SASL_FINAL: i32 = 12;

    /// Symbolic name of an authentication code, for error messages
    pub fn name(code: i32) -> &'static str {
        match code {
            OK => "OK",
            CLEARTEXT_PASSWORD => "CLEAR_TEXT",
            MD5_PASSWORD => "MD5",
            SASL => "SASL",
            SASL_CONTINUE => "SASL_CONTINUE",
            SASL_FINAL => "SASL_FINAL",
            2 => "KERBEROS_V5",
            6 => "SCM_CREDENTIAL",
            7 => "GSS",
            8 => "GSS_CONTINUE",
            9 => "SSPI",
            _ => "UNKNOWN",
        }
    }
}

/// SASL mechanism names
pub mod sasl {
    /// The only mechanism this client speaks
    pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";
}

/// Error and notice field codes
pub mod error_fields {
    pub const SEVERITY: u8 = b'S';
    pub const VSEVERITY: u8 = b'V';
    pub const CODE: u8 = b'C';
    pub const MESSAGE: u8 = b'M';
    pub const DETAIL: u8 = b'D';
    pub const HINT: u8 = b'H';
    pub const POSITION: u8 = b'P';
    pub const SCHEMA: u8 = b's';
    pub const TABLE: u8 = b't';
    pub const CONSTRAINT: u8 = b'n';
    pub const FILE: u8 = b'F';
    pub const LINE: u8 = b'L';
    pub const ROUTINE: u8 = b'R';
}

/// Type OIDs the result decoder understands
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const NAME: u32 = 19;
    pub const BIGINT: u32 = 20;
    pub const SMALLINT: u32 = 21;
    pub const INTEGER: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const VARCHAR: u32 = 1043;
}

/// Transaction status
pub mod tx_status {
    /// Idle (not in transaction)
    pub const IDLE: u8 = b'I';

    /// In transaction block
    pub const IN_TRANSACTION: u8 = b'T';

    /// Failed transaction (queries will be rejected until END)
    pub const FAILED: u8 = b'E';
}
