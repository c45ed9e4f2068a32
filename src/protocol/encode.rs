//! Protocol message encoding
//!
//! Every frame's size is computed before anything is written, so a message
//! (or a batch of messages) lands in a single allocation.

use super::constants::{describe, frontend, MAX_STATEMENT_NAME_LEN};
use super::message::{BindValue, FrontendMessage};
use bytes::{BufMut, BytesMut};
use std::io;

/// Encode a frontend message into bytes
pub fn encode_message(msg: &FrontendMessage) -> io::Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(encoded_len(msg)?);
    encode_into(&mut buf, msg)?;
    Ok(buf)
}

/// Encode several messages into one buffer, flushed together
pub fn encode_messages(msgs: &[FrontendMessage]) -> io::Result<BytesMut> {
    let mut total = 0;
    for msg in msgs {
        total += encoded_len(msg)?;
    }
    let mut buf = BytesMut::with_capacity(total);
    for msg in msgs {
        encode_into(&mut buf, msg)?;
    }
    Ok(buf)
}

/// The Bind frame plus the Describe(portal), Execute and Sync that always follow it
pub fn bind_sequence(statement: &str, values: Vec<BindValue>) -> [FrontendMessage; 4] {
    [
        FrontendMessage::Bind {
            statement: statement.to_string(),
            values,
        },
        FrontendMessage::Describe {
            kind: describe::PORTAL,
            name: String::new(),
        },
        FrontendMessage::Execute {
            portal: String::new(),
            max_rows: 0,
        },
        FrontendMessage::Sync,
    ]
}

/// Append a frontend message to an existing buffer
pub fn encode_into(buf: &mut BytesMut, msg: &FrontendMessage) -> io::Result<()> {
    let start = buf.len();
    let total = encoded_len(msg)?;
    buf.reserve(total);

    match msg {
        FrontendMessage::Startup { version, params } => {
            buf.put_i32(frame_len(total)?);
            buf.put_i32(*version);
            for (key, value) in params {
                put_cstr(buf, key)?;
                put_cstr(buf, value)?;
            }
            buf.put_u8(0);
        }
        FrontendMessage::Password(password) => {
            put_header(buf, frontend::PASSWORD, total)?;
            put_cstr(buf, password)?;
        }
        FrontendMessage::SaslInitialResponse { mechanism, data } => {
            put_header(buf, frontend::PASSWORD, total)?;
            put_cstr(buf, mechanism)?;
            buf.put_i32(frame_len(data.len())?);
            buf.put_slice(data);
        }
        FrontendMessage::SaslResponse { data } => {
            put_header(buf, frontend::PASSWORD, total)?;
            buf.put_slice(data);
        }
        FrontendMessage::Parse {
            name,
            query,
            param_types,
        } => {
            if name.len() > MAX_STATEMENT_NAME_LEN {
                tracing::warn!(
                    name = %name,
                    len = name.len(),
                    "statement name exceeds {} bytes and will be truncated by the server",
                    MAX_STATEMENT_NAME_LEN
                );
            }
            put_header(buf, frontend::PARSE, total)?;
            put_cstr(buf, name)?;
            put_cstr(buf, query)?;
            buf.put_i16(count16(param_types.len())?);
            for oid in param_types {
                buf.put_u32(*oid);
            }
        }
        FrontendMessage::Bind { statement, values } => {
            put_header(buf, frontend::BIND, total)?;
            // unnamed portal
            buf.put_u8(0);
            put_cstr(buf, statement)?;
            let count = count16(values.len())?;
            buf.put_i16(count);
            for value in values {
                buf.put_i16(value.format());
            }
            buf.put_i16(count);
            for value in values {
                match value.as_bytes() {
                    None => buf.put_i32(-1),
                    Some(bytes) => {
                        buf.put_i32(frame_len(bytes.len())?);
                        buf.put_slice(bytes);
                    }
                }
            }
            // no result format codes: every column comes back as text
            buf.put_i16(0);
        }
        FrontendMessage::Describe { kind, name } => {
            put_header(buf, frontend::DESCRIBE, total)?;
            buf.put_u8(*kind);
            put_cstr(buf, name)?;
        }
        FrontendMessage::Execute { portal, max_rows } => {
            put_header(buf, frontend::EXECUTE, total)?;
            put_cstr(buf, portal)?;
            buf.put_i32(*max_rows);
        }
        FrontendMessage::Sync => {
            put_header(buf, frontend::SYNC, total)?;
        }
        FrontendMessage::Query(query) => {
            put_header(buf, frontend::QUERY, total)?;
            put_cstr(buf, query)?;
        }
        FrontendMessage::Terminate => {
            put_header(buf, frontend::TERMINATE, total)?;
        }
    }

    debug_assert_eq!(buf.len() - start, total);
    Ok(())
}

/// Total encoded size of a message, including its tag byte
pub fn encoded_len(msg: &FrontendMessage) -> io::Result<usize> {
    let len = match msg {
        // no tag byte on startup
        FrontendMessage::Startup { params, .. } => {
            4 + 4
                + params
                    .iter()
                    .map(|(k, v)| k.len() + 1 + v.len() + 1)
                    .sum::<usize>()
                + 1
        }
        FrontendMessage::Password(password) => 1 + 4 + password.len() + 1,
        FrontendMessage::SaslInitialResponse { mechanism, data } => {
            1 + 4 + mechanism.len() + 1 + 4 + data.len()
        }
        FrontendMessage::SaslResponse { data } => 1 + 4 + data.len(),
        FrontendMessage::Parse {
            name,
            query,
            param_types,
        } => 1 + 4 + name.len() + 1 + query.len() + 1 + 2 + 4 * param_types.len(),
        FrontendMessage::Bind { statement, values } => {
            let payload: usize = values
                .iter()
                .map(|v| 4 + v.as_bytes().map_or(0, <[u8]>::len))
                .sum();
            1 + 4 + 1 + statement.len() + 1 + 2 + 2 * values.len() + 2 + payload + 2
        }
        FrontendMessage::Describe { name, .. } => 1 + 4 + 1 + name.len() + 1,
        FrontendMessage::Execute { portal, .. } => 1 + 4 + portal.len() + 1 + 4,
        FrontendMessage::Sync | FrontendMessage::Terminate => 1 + 4,
        FrontendMessage::Query(query) => 1 + 4 + query.len() + 1,
    };
    frame_len(len)?;
    Ok(len)
}

fn put_header(buf: &mut BytesMut, tag: u8, total: usize) -> io::Result<()> {
    buf.put_u8(tag);
    // length field counts itself but not the tag
    buf.put_i32(frame_len(total - 1)?);
    Ok(())
}

fn put_cstr(buf: &mut BytesMut, s: &str) -> io::Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "string contains an interior NUL byte",
        ));
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

fn frame_len(len: usize) -> io::Result<i32> {
    i32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message of {} bytes exceeds the protocol limit", len),
        )
    })
}

fn count16(n: usize) -> io::Result<i16> {
    i16::try_from(n).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} items exceed the 16-bit count limit", n),
        )
    })
}
