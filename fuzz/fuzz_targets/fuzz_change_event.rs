#![no_main]

use leaddesk::sync::ChangeEvent;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(event) = ChangeEvent::parse(data) {
        assert!(!event.table.is_empty());
        let _ = event.is_messages();
    }
});
