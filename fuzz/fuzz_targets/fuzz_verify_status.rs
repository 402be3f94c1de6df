#![no_main]

use fprint_core::{VerificationEvent, VerifyResult};
use libfuzzer_sys::fuzz_target;

const DEVICE: &str = "/net/reactivated/Fprint/Device/0";

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    let result = VerifyResult::parse(raw);

    // Parsing is lossless
    assert_eq!(result.as_str(), raw);

    // Only the two scan outcomes end a cycle
    let outcome = result.is_scan_outcome();
    assert_eq!(outcome, raw == "verify-match" || raw == "verify-no-match");
    assert!(!(outcome && result.is_retry_hint()));

    // Status events are scoped to the emitting device
    let event = VerificationEvent::status(DEVICE, result.clone(), outcome);
    assert_eq!(event.result_for(DEVICE), Some(&result));
    assert_eq!(event.result_for(raw), if raw == DEVICE { Some(&result) } else { None });
});
