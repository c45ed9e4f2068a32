//! Label keys and well-known label values

/// Authentication mechanism label key
pub const MECHANISM: &str = "mechanism";
/// Failure reason label key
pub const REASON: &str = "reason";
/// Query kind label key
pub const KIND: &str = "kind";
/// Outcome label key
pub const STATUS: &str = "status";

pub const MECHANISM_CLEARTEXT: &str = "cleartext";
pub const MECHANISM_MD5: &str = "md5";
pub const MECHANISM_SCRAM: &str = "scram-sha-256";
/// Server accepted the startup without asking for credentials
pub const MECHANISM_TRUST: &str = "trust";

pub const KIND_SIMPLE: &str = "simple";
pub const KIND_PREPARED: &str = "prepared";

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

pub const REASON_IDLE: &str = "idle_timeout";
pub const REASON_REQUESTED: &str = "requested";
pub const REASON_FAILURE: &str = "failure";
