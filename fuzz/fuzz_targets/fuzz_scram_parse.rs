#![no_main]

use libfuzzer_sys::arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use pgwire_pool::auth::SaslState;

#[derive(Debug)]
struct ScramInput {
    password: String,
    mechanisms: Vec<String>,
    server_first: Vec<u8>,
    server_final: Vec<u8>,
}

impl<'a> Arbitrary<'a> for ScramInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> libfuzzer_sys::arbitrary::Result<Self> {
        Ok(Self {
            password: u.arbitrary()?,
            mechanisms: u.arbitrary()?,
            server_first: u.arbitrary()?,
            server_final: u.arbitrary()?,
        })
    }
}

fuzz_target!(|input: ScramInput| {
    let mut sasl = SaslState::default();
    if sasl.start(&input.mechanisms, &input.password).is_err() {
        return;
    }
    if sasl.challenge(&input.server_first).is_ok() {
        let _ = sasl.finish(&input.server_final);
    }
});
