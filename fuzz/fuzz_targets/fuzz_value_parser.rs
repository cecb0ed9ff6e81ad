//! Fuzz target: `parse_value`
//!
//! Any text must parse to either a typed value or raw text, never panic,
//! and raw text is always the trimmed input.
//!
//! cargo fuzz run fuzz_value_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use taskrig::variables::{parse_value, Parsed, Value};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    match parse_value(text) {
        Parsed::Raw(raw) => assert_eq!(raw, text.trim()),
        Parsed::Value(Value::Float(f)) => assert!(f.is_finite()),
        Parsed::Value(value) => {
            // Typed values survive the JSON storage path.
            let _ = Value::from_json(value.to_json());
        }
    }
});
