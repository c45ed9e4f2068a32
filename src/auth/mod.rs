//! Authentication mechanisms
//!
//! * Clear-text password
//! * MD5 (`md5` + double hash with the server salt)
//! * SCRAM-SHA-256 (RFC 7677), without channel binding

mod md5;
pub mod scram;

pub use self::md5::md5_password;
pub use scram::{compute_proof, SaslState, ScramClient, ScramError, ScramState};
