//! Fuzz target: `FrameDecoder::decode`
//!
//! Drives arbitrary byte sequences through the streaming frame decoder in
//! arbitrary chunk sizes and asserts that it never panics, always makes
//! progress, and never yields an empty or oversized payload.  Every payload
//! is also offered to the command decoder, which must fail cleanly.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use taskrig::app::commands::HostCommand;
use taskrig::link::codec::{decode_message, FrameDecoder, MAX_FRAME_SIZE};

fuzz_target!(|data: &[u8]| {
    let Some((&chunk, stream)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk).max(1);
    let mut decoder = FrameDecoder::new();

    for piece in stream.chunks(chunk) {
        let mut rest = piece;
        while !rest.is_empty() {
            let (used, frame) = decoder.decode(rest);
            assert!(used > 0, "decoder must consume input");
            assert!(used <= rest.len());
            if let Some(payload) = frame {
                assert!(!payload.is_empty(), "decoder must not yield empty payload");
                assert!(payload.len() <= MAX_FRAME_SIZE, "payload exceeds MAX_FRAME_SIZE");
                let _ = decode_message::<HostCommand>(payload);
            }
            rest = &rest[used..];
        }
    }

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    let _ = decoder.decode(stream);
});
