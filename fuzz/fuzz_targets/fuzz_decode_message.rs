#![no_main]

use libfuzzer_sys::fuzz_target;
use pgwire_pool::protocol::decode_message;

fuzz_target!(|data: &[u8]| {
    // Several frames may arrive in one read
    let mut rest = data;
    while !rest.is_empty() {
        match decode_message(rest) {
            Ok(Some((_, consumed))) if consumed > 0 => rest = &rest[consumed..],
            _ => break,
        }
    }
});
