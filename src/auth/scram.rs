//! SCRAM-SHA-256 authentication implementation
//!
//! Implements the SCRAM-SHA-256 (Salted Challenge Response Authentication Mechanism)
//! as defined in RFC 5802 / RFC 7677 for PostgreSQL authentication (Postgres 10+).
//!
//! The server ignores the SCRAM username in favour of the one sent at startup,
//! so the client-first message always carries `n=*`. Channel binding is not used.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::protocol::constants::sasl::SCRAM_SHA_256;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of randomness behind the client nonce
const NONCE_LEN: usize = 18;

/// GS2 header without channel binding
const GS2_HEADER: &str = "n,,";

/// base64("n,,")
const CHANNEL_BINDING: &str = "biws";

/// SCRAM authentication error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScramError {
    /// Server signature did not match the one we derived
    InvalidServerProof(String),
    /// Invalid server message format
    InvalidServerMessage(String),
    /// UTF-8 encoding/decoding error
    Utf8Error(String),
    /// Base64 decoding error
    Base64Error(String),
    /// Server offered something other than exactly SCRAM-SHA-256
    UnsupportedMechanism(Vec<String>),
    /// SASL message arrived in the wrong phase of the exchange
    UnexpectedPhase {
        /// Phase the message requires
        expected: &'static str,
        /// Phase the exchange was in
        actual: &'static str,
    },
}

impl fmt::Display for ScramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScramError::InvalidServerProof(msg) => write!(f, "invalid server proof: {}", msg),
            ScramError::InvalidServerMessage(msg) => write!(f, "invalid server message: {}", msg),
            ScramError::Utf8Error(msg) => write!(f, "UTF-8 error: {}", msg),
            ScramError::Base64Error(msg) => write!(f, "Base64 error: {}", msg),
            ScramError::UnsupportedMechanism(offered) => write!(
                f,
                "server offered {:?}, only [\"{}\"] is supported",
                offered, SCRAM_SHA_256
            ),
            ScramError::UnexpectedPhase { expected, actual } => write!(
                f,
                "SASL exchange in phase {}, expected {}",
                actual, expected
            ),
        }
    }
}

impl std::error::Error for ScramError {}

/// Values carried forward from the client-final step for verification
#[derive(Clone, Debug)]
pub struct ScramState {
    /// Combined authentication message
    auth_message: String,
    /// base64(HMAC(ServerKey, AuthMessage))
    server_signature: String,
}

/// SCRAM-SHA-256 client implementation
#[derive(Clone)]
pub struct ScramClient {
    password: String,
    nonce: String,
}

impl fmt::Debug for ScramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramClient")
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

impl ScramClient {
    /// Create a new SCRAM client with a fresh random nonce
    pub fn new(password: String) -> Self {
        let mut rng = rand::thread_rng();
        let nonce_bytes: [u8; NONCE_LEN] = rng.gen();
        Self::with_nonce(password, BASE64.encode(nonce_bytes))
    }

    /// Create a SCRAM client with a caller-chosen nonce
    pub fn with_nonce(password: String, nonce: String) -> Self {
        Self { password, nonce }
    }

    /// Client nonce
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    fn client_first_bare(&self) -> String {
        format!("n=*,r={}", self.nonce)
    }

    /// Generate client first message
    pub fn client_first(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare())
    }

    /// Process server first message and generate client final message
    ///
    /// Returns (client_final_message, internal_state)
    pub fn client_final(&self, server_first: &str) -> Result<(String, ScramState), ScramError> {
        let first = parse_server_first(server_first)?;

        validate_nonce(&first.nonce, &self.nonce)?;
        if !is_strict_base64(&first.salt) {
            return Err(ScramError::Base64Error("invalid salt encoding".to_string()));
        }
        let iterations = parse_iterations(&first.iterations)?;
        let salt_bytes = BASE64
            .decode(&first.salt)
            .map_err(|_| ScramError::Base64Error("invalid salt encoding".to_string()))?;

        let server_first_reconstructed = format!(
            "r={},s={},i={}",
            first.nonce, first.salt, first.iterations
        );
        let client_final_without_proof = format!("c={},r={}", CHANNEL_BINDING, first.nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first_reconstructed,
            client_final_without_proof
        );

        let (proof, server_signature) =
            compute_proof(&self.password, &salt_bytes, iterations, &auth_message)?;

        let client_final = format!("{},p={}", client_final_without_proof, proof);
        let state = ScramState {
            auth_message,
            server_signature,
        };

        Ok((client_final, state))
    }

    /// Verify server final message and confirm authentication
    pub fn verify_server_final(
        &self,
        server_final: &str,
        state: &ScramState,
    ) -> Result<(), ScramError> {
        let entries = parse_entries(server_final)?;
        let signature = entries
            .into_iter()
            .find_map(|(key, value)| (key == 'v').then_some(value))
            .ok_or_else(|| ScramError::InvalidServerMessage("missing 'v=' entry".to_string()))?;

        if !is_strict_base64(signature) {
            return Err(ScramError::Base64Error(
                "invalid server signature encoding".to_string(),
            ));
        }

        if constant_time_compare(signature.as_bytes(), state.server_signature.as_bytes()) {
            Ok(())
        } else {
            tracing::debug!(auth_message = %state.auth_message, "server signature mismatch");
            Err(ScramError::InvalidServerProof(
                "server signature verification failed".to_string(),
            ))
        }
    }
}

/// Per-connection progress through the SASL exchange
#[derive(Debug, Default)]
pub enum SaslState {
    /// No exchange in flight
    #[default]
    Empty,
    /// Client-first sent, waiting for the server challenge
    InitialResponse {
        /// Client holding the nonce and password
        client: ScramClient,
    },
    /// Client-final sent, waiting for the server signature
    Response {
        /// Client holding the nonce and password
        client: ScramClient,
        /// Expected signature and auth message
        state: ScramState,
    },
}

impl SaslState {
    /// Phase name for logs and errors
    pub fn phase(&self) -> &'static str {
        match self {
            SaslState::Empty => "empty",
            SaslState::InitialResponse { .. } => "initial_response",
            SaslState::Response { .. } => "response",
        }
    }

    /// Fails unless no exchange is in flight
    ///
    /// AuthenticationOk must not arrive before the server signature has been
    /// verified.
    pub fn ensure_complete(&self) -> Result<(), ScramError> {
        match self {
            SaslState::Empty => Ok(()),
            other => Err(ScramError::UnexpectedPhase {
                expected: "empty",
                actual: other.phase(),
            }),
        }
    }

    /// Handle the server's mechanism list; returns the client-first message
    pub fn start(&mut self, mechanisms: &[String], password: &str) -> Result<String, ScramError> {
        self.start_with(mechanisms, ScramClient::new(password.to_string()))
    }

    /// Same as [`SaslState::start`] with a prepared client
    pub fn start_with(
        &mut self,
        mechanisms: &[String],
        client: ScramClient,
    ) -> Result<String, ScramError> {
        if !matches!(self, SaslState::Empty) {
            return Err(ScramError::UnexpectedPhase {
                expected: "empty",
                actual: self.phase(),
            });
        }
        if mechanisms.len() != 1 || mechanisms[0] != SCRAM_SHA_256 {
            return Err(ScramError::UnsupportedMechanism(mechanisms.to_vec()));
        }

        let first = client.client_first();
        *self = SaslState::InitialResponse { client };
        Ok(first)
    }

    /// Handle the server-first message; returns the client-final message
    pub fn challenge(&mut self, data: &[u8]) -> Result<String, ScramError> {
        let client = match std::mem::take(self) {
            SaslState::InitialResponse { client } => client,
            other => {
                let actual = other.phase();
                *self = other;
                return Err(ScramError::UnexpectedPhase {
                    expected: "initial_response",
                    actual,
                });
            }
        };

        let server_first = utf8(data)?;
        let (client_final, state) = client.client_final(server_first)?;
        *self = SaslState::Response { client, state };
        Ok(client_final)
    }

    /// Handle the server-final message; resets to `Empty` on success
    pub fn finish(&mut self, data: &[u8]) -> Result<(), ScramError> {
        let SaslState::Response { client, state } = &*self else {
            return Err(ScramError::UnexpectedPhase {
                expected: "response",
                actual: self.phase(),
            });
        };

        client.verify_server_final(utf8(data)?, state)?;
        *self = SaslState::Empty;
        Ok(())
    }
}

fn utf8(data: &[u8]) -> Result<&str, ScramError> {
    std::str::from_utf8(data).map_err(|e| ScramError::Utf8Error(e.to_string()))
}

/// Fields of the server-first message
#[derive(Debug, Default, PartialEq, Eq)]
struct ServerFirst {
    nonce: String,
    salt: String,
    iterations: String,
}

/// Split a SCRAM message into `(key, value)` entries; every entry must be one of r/s/i/v
fn parse_entries(msg: &str) -> Result<Vec<(char, &str)>, ScramError> {
    msg.split(',')
        .map(|entry| {
            let mut chars = entry.chars();
            match (chars.next(), chars.next()) {
                (Some(key @ ('r' | 's' | 'i' | 'v')), Some('=')) => Ok((key, &entry[2..])),
                _ => Err(ScramError::InvalidServerMessage(format!(
                    "unexpected SASL entry {:?}",
                    entry
                ))),
            }
        })
        .collect()
}

/// Parse server first message format: r=<nonce>,s=<salt>,i=<iterations>
fn parse_server_first(msg: &str) -> Result<ServerFirst, ScramError> {
    let mut first = ServerFirst::default();

    for (key, value) in parse_entries(msg)? {
        match key {
            'r' => first.nonce = value.to_string(),
            's' => first.salt = value.to_string(),
            'i' => first.iterations = value.to_string(),
            _ => {}
        }
    }

    if first.nonce.is_empty() || first.salt.is_empty() || first.iterations.is_empty() {
        return Err(ScramError::InvalidServerMessage(
            "missing required fields in server first message".to_string(),
        ));
    }

    Ok(first)
}

/// Printable ASCII except comma, prefixed by the client nonce, and strictly longer
fn validate_nonce(server_nonce: &str, client_nonce: &str) -> Result<(), ScramError> {
    let printable = server_nonce
        .bytes()
        .all(|b| matches!(b, 0x21..=0x2b | 0x2d..=0x7e));
    if !printable {
        return Err(ScramError::InvalidServerMessage(
            "server nonce contains non-printable characters".to_string(),
        ));
    }
    if !server_nonce.starts_with(client_nonce) {
        return Err(ScramError::InvalidServerMessage(
            "server nonce doesn't contain client nonce".to_string(),
        ));
    }
    if server_nonce.len() <= client_nonce.len() {
        return Err(ScramError::InvalidServerMessage(
            "server nonce doesn't extend client nonce".to_string(),
        ));
    }
    Ok(())
}

/// Positive decimal without leading zeros
fn parse_iterations(raw: &str) -> Result<u32, ScramError> {
    let well_formed = raw.starts_with(|c: char| ('1'..='9').contains(&c))
        && raw.bytes().all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(ScramError::InvalidServerMessage(format!(
            "invalid iteration count {:?}",
            raw
        )));
    }
    raw.parse::<u32>()
        .map_err(|_| ScramError::InvalidServerMessage("invalid iteration count".to_string()))
}

/// Padded standard-alphabet base64 with no stray characters
fn is_strict_base64(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() % 4 != 0 {
        return false;
    }
    let alphabet = |b: u8| b.is_ascii_alphanumeric() || b == b'+' || b == b'/';
    let padding = match bytes {
        [.., b'=', b'='] => 2,
        [.., b'='] => 1,
        _ => 0,
    };
    bytes[..bytes.len() - padding].iter().all(|&b| alphabet(b))
}

/// Derive the client proof and expected server signature, both base64
pub fn compute_proof(
    password: &str,
    salt: &[u8],
    iterations: u32,
    auth_message: &str,
) -> Result<(String, String), ScramError> {
    // SaltedPassword := PBKDF2(password, salt, iterations, HMAC-SHA256)
    let mut salted_password = [0u8; 32];
    pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut salted_password)
        .map_err(|_| ScramError::InvalidServerMessage("key derivation failed".to_string()))?;

    // ClientKey := HMAC(SaltedPassword, "Client Key")
    let client_key = hmac(&salted_password, b"Client Key")?;

    // StoredKey := SHA256(ClientKey)
    let stored_key = Sha256::digest(&client_key);

    // ClientSignature := HMAC(StoredKey, AuthMessage)
    let client_signature = hmac(&stored_key, auth_message.as_bytes())?;

    // ClientProof := ClientKey XOR ClientSignature
    let proof = xor(&client_key, &client_signature)?;

    // ServerSignature := HMAC(HMAC(SaltedPassword, "Server Key"), AuthMessage)
    let server_key = hmac(&salted_password, b"Server Key")?;
    let server_signature = hmac(&server_key, auth_message.as_bytes())?;

    Ok((BASE64.encode(proof), BASE64.encode(server_signature)))
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, ScramError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| ScramError::InvalidServerMessage("HMAC key error".to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>, ScramError> {
    if a.len() != b.len() || a.is_empty() {
        return Err(ScramError::InvalidServerMessage(format!(
            "cannot xor buffers of length {} and {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
