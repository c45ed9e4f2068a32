//! Protocol message decoding

use super::constants::{auth, error_fields, tags};
use super::message::{AuthenticationMessage, BackendMessage, ErrorFields, FieldDescription};
use bytes::Bytes;
use std::io;

/// Maximum message length (1 GB), matching PostgreSQL's own `PQ_LARGE_MESSAGE_LIMIT`.
///
/// Any message whose length field exceeds this value is rejected before allocation
/// to prevent denial-of-service via crafted length headers.
const MAX_MESSAGE_LENGTH: usize = 1_073_741_824;

/// Decode one backend message from the front of `data`
///
/// A single socket read may carry several frames, or part of one. The caller
/// loops, advancing its buffer by the consumed count each time.
///
/// # Returns
/// `Ok(Some((msg, consumed)))` - a complete frame was decoded
/// `Ok(None)` - the buffer holds only part of a frame; read more
/// `Err(e)` - the frame is malformed or carries an unknown tag
pub fn decode_message(data: &[u8]) -> io::Result<Option<(BackendMessage, usize)>> {
    if data.len() < 5 {
        return Ok(None);
    }

    let tag = data[0];
    let raw_len = i32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    if raw_len < 4 {
        return Err(invalid(format!("invalid message length {}", raw_len)));
    }
    let len = raw_len as usize;

    if len > MAX_MESSAGE_LENGTH {
        return Err(invalid(format!(
            "message length {} exceeds maximum allowed {}",
            len, MAX_MESSAGE_LENGTH
        )));
    }

    if data.len() < len + 1 {
        return Ok(None);
    }

    let body = &data[5..len + 1];

    let msg = match tag {
        tags::AUTHENTICATION => decode_authentication(body)?,
        tags::BACKEND_KEY_DATA => decode_backend_key_data(body)?,
        tags::BIND_COMPLETE => BackendMessage::BindComplete,
        tags::COMMAND_COMPLETE => BackendMessage::CommandComplete(read_cstr(body, &mut 0)?),
        tags::DATA_ROW => decode_data_row(body)?,
        tags::ERROR_RESPONSE => BackendMessage::ErrorResponse(decode_error_fields(body)?),
        tags::NO_DATA => BackendMessage::NoData,
        tags::NOTICE_RESPONSE => BackendMessage::NoticeResponse(decode_error_fields(body)?),
        tags::PARAMETER_STATUS => decode_parameter_status(body)?,
        tags::PARSE_COMPLETE => BackendMessage::ParseComplete,
        tags::READY_FOR_QUERY => decode_ready_for_query(body)?,
        tags::ROW_DESCRIPTION => decode_row_description(body)?,
        _ => {
            return Err(invalid(format!(
                "unsupported message tag: {:?}",
                tag as char
            )))
        }
    };

    Ok(Some((msg, len + 1)))
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn eof(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, what.to_string())
}

fn read_i16(data: &[u8], offset: &mut usize, what: &str) -> io::Result<i16> {
    let bytes = data.get(*offset..*offset + 2).ok_or_else(|| eof(what))?;
    *offset += 2;
    Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_i32(data: &[u8], offset: &mut usize, what: &str) -> io::Result<i32> {
    let bytes = data.get(*offset..*offset + 4).ok_or_else(|| eof(what))?;
    *offset += 4;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_cstr(data: &[u8], offset: &mut usize) -> io::Result<String> {
    let rest = data.get(*offset..).unwrap_or_default();
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| invalid("missing null terminator in string"))?;
    let s = std::str::from_utf8(&rest[..end])
        .map_err(|e| invalid(format!("invalid UTF-8 in string: {}", e)))?
        .to_string();
    *offset += end + 1;
    Ok(s)
}

fn decode_authentication(data: &[u8]) -> io::Result<BackendMessage> {
    let mut offset = 0;
    let auth_type = read_i32(data, &mut offset, "auth type")?;

    let auth_msg = match auth_type {
        auth::OK => AuthenticationMessage::Ok,
        auth::CLEARTEXT_PASSWORD => AuthenticationMessage::CleartextPassword,
        auth::MD5_PASSWORD => {
            let salt = data.get(4..8).ok_or_else(|| eof("salt data"))?;
            AuthenticationMessage::Md5Password {
                salt: [salt[0], salt[1], salt[2], salt[3]],
            }
        }
        auth::SASL => {
            // null-terminated mechanism names, closed by an empty one
            let mut mechanisms = Vec::new();
            while offset < data.len() {
                let mechanism = read_cstr(data, &mut offset)?;
                if mechanism.is_empty() {
                    break;
                }
                mechanisms.push(mechanism);
            }
            AuthenticationMessage::Sasl { mechanisms }
        }
        auth::SASL_CONTINUE => AuthenticationMessage::SaslContinue {
            data: data[4..].to_vec(),
        },
        auth::SASL_FINAL => AuthenticationMessage::SaslFinal {
            data: data[4..].to_vec(),
        },
        other => AuthenticationMessage::Unsupported(other),
    };

    Ok(BackendMessage::Authentication(auth_msg))
}

fn decode_backend_key_data(data: &[u8]) -> io::Result<BackendMessage> {
    let mut offset = 0;
    let process_id = read_i32(data, &mut offset, "backend key data")?;
    let secret_key = read_i32(data, &mut offset, "backend key data")?;
    Ok(BackendMessage::BackendKeyData {
        process_id,
        secret_key,
    })
}

fn decode_data_row(data: &[u8]) -> io::Result<BackendMessage> {
    let mut offset = 0;
    let field_count = read_i16(data, &mut offset, "field count")?.max(0) as usize;
    let mut fields = Vec::with_capacity(field_count);

    for _ in 0..field_count {
        let field_len = read_i32(data, &mut offset, "field length")?;
        let field = if field_len < 0 {
            None
        } else {
            let len = field_len as usize;
            let bytes = data
                .get(offset..offset + len)
                .ok_or_else(|| eof("field data"))?;
            offset += len;
            Some(Bytes::copy_from_slice(bytes))
        };
        fields.push(field);
    }

    Ok(BackendMessage::DataRow(fields))
}

fn decode_error_fields(data: &[u8]) -> io::Result<ErrorFields> {
    let mut fields = ErrorFields::default();
    let mut offset = 0;

    while offset < data.len() {
        let field_type = data[offset];
        offset += 1;
        if field_type == 0 {
            break;
        }

        let value = read_cstr(data, &mut offset)?;

        match field_type {
            error_fields::SEVERITY => fields.severity = Some(value),
            error_fields::VSEVERITY => fields.vseverity = Some(value),
            error_fields::CODE => fields.code = Some(value),
            error_fields::MESSAGE => fields.message = Some(value),
            error_fields::DETAIL => fields.detail = Some(value),
            error_fields::HINT => fields.hint = Some(value),
            error_fields::POSITION => fields.position = Some(value),
            error_fields::SCHEMA => fields.schema = Some(value),
            error_fields::TABLE => fields.table = Some(value),
            error_fields::CONSTRAINT => fields.constraint = Some(value),
            error_fields::FILE => fields.file = Some(value),
            error_fields::LINE => fields.line = Some(value),
            error_fields::ROUTINE => fields.routine = Some(value),
            other => {
                tracing::warn!(field = %(other as char), value = %value, "unknown error field");
            }
        }
    }

    Ok(fields)
}

fn decode_parameter_status(data: &[u8]) -> io::Result<BackendMessage> {
    let mut offset = 0;
    let name = read_cstr(data, &mut offset)?;
    let value = read_cstr(data, &mut offset)?;
    Ok(BackendMessage::ParameterStatus { name, value })
}

fn decode_ready_for_query(data: &[u8]) -> io::Result<BackendMessage> {
    let status = *data.first().ok_or_else(|| eof("status byte"))?;
    Ok(BackendMessage::ReadyForQuery { status })
}

fn decode_row_description(data: &[u8]) -> io::Result<BackendMessage> {
    let mut offset = 0;
    let field_count = read_i16(data, &mut offset, "field count")?.max(0) as usize;
    let mut fields = Vec::with_capacity(field_count);

    for _ in 0..field_count {
        let name = read_cstr(data, &mut offset)?;
        let table_oid = read_i32(data, &mut offset, "field descriptor")?;
        let column_attr = read_i16(data, &mut offset, "field descriptor")?;
        let type_oid = read_i32(data, &mut offset, "field descriptor")? as u32;
        let type_size = read_i16(data, &mut offset, "field descriptor")?;
        let type_modifier = read_i32(data, &mut offset, "field descriptor")?;
        let format_code = read_i16(data, &mut offset, "field descriptor")?;

        fields.push(FieldDescription {
            name,
            table_oid,
            column_attr,
            type_oid,
            type_size,
            type_modifier,
            format_code,
        });
    }

    Ok(BackendMessage::RowDescription(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_decode_authentication_ok() {
        let data = [
            b'R', // Authentication
            0, 0, 0, 8, // Length = 8
            0, 0, 0, 0, // Auth OK
        ];

        let (msg, consumed) = decode_message(&data).unwrap().unwrap();
        match msg {
            BackendMessage::Authentication(AuthenticationMessage::Ok) => {}
            _ => panic!("expected Authentication::Ok"),
        }
        assert_eq!(consumed, 9); // 1 tag + 4 len + 4 auth type
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let data = frame(b'C', b"SELECT \xff1\0");
        let err = decode_message(&data).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut body = vec![0, 1];
        body.extend_from_slice(b"na\xc3me\0");
        body.extend_from_slice(&[0; 18]);
        assert!(decode_message(&frame(b'T', &body)).is_err());
    }

    #[test]
    fn test_decode_md5_salt() {
        let data = frame(b'R', &[0, 0, 0, 5, 1, 2, 3, 4]);
        let (msg, _) = decode_message(&data).unwrap().unwrap();
        match msg {
            BackendMessage::Authentication(AuthenticationMessage::Md5Password { salt }) => {
                assert_eq!(salt, [1, 2, 3, 4])
            }
            other => panic!("expected Md5Password, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_sasl_mechanisms() {
        let data = frame(b'R', b"\0\0\0\x0aSCRAM-SHA-256\0\0");
        let (msg, _) = decode_message(&data).unwrap().unwrap();
        match msg {
            BackendMessage::Authentication(AuthenticationMessage::Sasl { mechanisms }) => {
                assert_eq!(mechanisms, vec!["SCRAM-SHA-256".to_string()])
            }
            other => panic!("expected Sasl, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_auth_code_is_not_a_decode_error() {
        let data = frame(b'R', &[0, 0, 0, 7]);
        let (msg, _) = decode_message(&data).unwrap().unwrap();
        assert!(matches!(
            msg,
            BackendMessage::Authentication(AuthenticationMessage::Unsupported(7))
        ));
    }

    #[test]
    fn test_partial_frame_needs_more_data() {
        let data = frame(b'Z', b"I");
        assert!(decode_message(&data[..3]).unwrap().is_none());
        assert!(decode_message(&data[..5]).unwrap().is_none());
        assert!(decode_message(&data).unwrap().is_some());
    }

    #[test]
    fn test_several_frames_in_one_buffer() {
        let mut data = frame(b'1', &[]);
        data.extend(frame(b'2', &[]));
        data.extend(frame(b'Z', b"I"));

        let mut offset = 0;
        let mut names = Vec::new();
        while let Some((msg, consumed)) = decode_message(&data[offset..]).unwrap() {
            names.push(msg.name());
            offset += consumed;
        }
        assert_eq!(names, vec!["ParseComplete", "BindComplete", "ReadyForQuery"]);
        assert_eq!(offset, data.len());
    }

    #[test]
    fn test_decode_rejects_oversized_message() {
        let oversized_len = (super::MAX_MESSAGE_LENGTH as i32) + 1;
        let len_bytes = oversized_len.to_be_bytes();
        let data = [b'D', len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]];

        let err = decode_message(&data).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let data = frame(b'W', &[]);
        let err = decode_message(&data).unwrap_err();
        assert!(err.to_string().contains("unsupported message tag"));
    }

    #[test]
    fn test_decode_data_row_with_null() {
        let body = [
            0, 2, // two columns
            0, 0, 0, 2, b'1', b'0', // "10"
            0xff, 0xff, 0xff, 0xff, // NULL
        ];
        let (msg, _) = decode_message(&frame(b'D', &body)).unwrap().unwrap();
        match msg {
            BackendMessage::DataRow(fields) => {
                assert_eq!(fields[0].as_deref(), Some(&b"10"[..]));
                assert!(fields[1].is_none());
            }
            other => panic!("expected DataRow, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_row_description() {
        let mut body = vec![0, 1];
        body.extend_from_slice(b"id\0");
        body.extend_from_slice(&0i32.to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());
        body.extend_from_slice(&23i32.to_be_bytes());
        body.extend_from_slice(&4i16.to_be_bytes());
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());

        let (msg, _) = decode_message(&frame(b'T', &body)).unwrap().unwrap();
        match msg {
            BackendMessage::RowDescription(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].name, "id");
                assert_eq!(fields[0].type_oid, 23);
            }
            other => panic!("expected RowDescription, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_fields_skips_unknown_codes() {
        let body = b"SERROR\0C42P01\0Mno such table\0Xmystery\0ttodos\0\0";
        let (msg, _) = decode_message(&frame(b'E', body)).unwrap().unwrap();
        match msg {
            BackendMessage::ErrorResponse(fields) => {
                assert_eq!(fields.severity.as_deref(), Some("ERROR"));
                assert_eq!(fields.code.as_deref(), Some("42P01"));
                assert_eq!(fields.table.as_deref(), Some("todos"));
            }
            other => panic!("expected ErrorResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_ready_for_query() {
        let data = [
            b'Z', // ReadyForQuery
            0, 0, 0, 5,    // Length = 5
            b'I', // Idle
        ];

        let (msg, consumed) = decode_message(&data).unwrap().unwrap();
        match msg {
            BackendMessage::ReadyForQuery { status } => assert_eq!(status, b'I'),
            _ => panic!("expected ReadyForQuery"),
        }
        assert_eq!(consumed, 6); // 1 tag + 4 len + 1 status
    }
}
