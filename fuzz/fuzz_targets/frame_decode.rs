//! Fuzz target for the rowing data frame decoder.
//!
//! Tests:
//! - Arbitrary bytes never panic the decoder
//! - Decoded values are always finite
//! - A frame too short for the mandatory fields decodes to nothing

#![no_main]

use libfuzzer_sys::fuzz_target;
use rowing_daq::metrics::MetricsSnapshot;
use rowing_daq::protocol::decode;

fuzz_target!(|data: &[u8]| {
    let fields = decode(data);

    for (metric, value) in fields.iter() {
        assert!(value.is_finite(), "{metric} decoded to {value}");
    }

    // Flags plus the mandatory stroke rate and stroke count.
    if data.len() < 5 {
        assert!(fields.is_empty());
        assert_eq!(fields.is_truncated(), !data.is_empty());
    }

    let mut snapshot = MetricsSnapshot::new();
    snapshot.merge(&fields);
    assert_eq!(snapshot.is_empty(), fields.is_empty());
});
