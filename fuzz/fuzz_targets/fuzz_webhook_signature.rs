#![no_main]

use arbitrary::Arbitrary;
use leaddesk::fuzz_api::validate_webhook_signature;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    secret: String,
    signature: String,
    body: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let _ = validate_webhook_signature(&input.secret, &input.signature, &input.body);
});
