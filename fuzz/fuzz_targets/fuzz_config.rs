#![no_main]

use fprint_core::VerifyConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary JSON must never panic the loader or validator
    if let Ok(config) = serde_json::from_slice::<VerifyConfig>(data) {
        if config.validate().is_ok() {
            assert!(config.max_attempts >= 1);
            assert!(config.device_path.starts_with('/'));

            // Valid configs survive a round-trip
            let json = serde_json::to_vec(&config).unwrap();
            let reparsed: VerifyConfig = serde_json::from_slice(&json).unwrap();
            assert_eq!(config, reparsed);
        }
    }
});
