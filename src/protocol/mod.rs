//! Postgres wire protocol (v3) framing
//!
//! Only the subset needed by this client is implemented:
//! * Startup and authentication (clear-text, MD5, SCRAM-SHA-256)
//! * Simple query
//! * Extended query (Parse / Bind / Describe / Execute / Sync)
//! * Error and notice responses

pub mod constants;
mod decode;
mod encode;
mod message;

pub use decode::decode_message;
pub use encode::{bind_sequence, encode_into, encode_message, encode_messages, encoded_len};
pub use message::{
    AuthenticationMessage, BackendMessage, BindValue, ErrorFields, FieldDescription,
    FrontendMessage,
};
