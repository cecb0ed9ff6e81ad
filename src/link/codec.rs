//! Length-prefix frame codec for the host link.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Length (4B)│ postcard payload (N B)   │
//! │ LE u32     │                          │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! The decoder is fed whatever the transport returned (part of a header,
//! part of a payload, several frames back to back) and yields complete
//! payloads one at a time.  A header announcing an empty or oversized frame
//! is counted and its payload skipped, so the stream stays in sync.

use heapless::Vec as FrameBuf;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Maximum frame payload size.
pub const MAX_FRAME_SIZE: usize = 512;

/// Frame header size (4-byte little-endian length).
pub const HEADER_SIZE: usize = 4;

enum DecoderState {
    ReadingHeader { collected: usize },
    ReadingPayload { expected: usize },
    /// Skipping the body of a rejected frame.
    Discarding { remaining: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header: [u8; HEADER_SIZE],
    payload: FrameBuf<u8, MAX_FRAME_SIZE>,
    rejected: u32,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header: [0; HEADER_SIZE],
            payload: FrameBuf::new(),
            rejected: 0,
        }
    }

    /// Consume bytes from `data` up to the end of the next complete frame.
    ///
    /// Returns how many bytes were consumed and, if a frame completed, its
    /// payload.  The payload is valid until the next call; bytes past the
    /// consumed count belong to the following frame.
    pub fn decode(&mut self, data: &[u8]) -> (usize, Option<&[u8]>) {
        let mut offset = 0;
        while offset < data.len() {
            let available = data.len() - offset;
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let take = (HEADER_SIZE - *collected).min(available);
                    self.header[*collected..*collected + take]
                        .copy_from_slice(&data[offset..offset + take]);
                    *collected += take;
                    offset += take;
                    if *collected == HEADER_SIZE {
                        let expected = u32::from_le_bytes(self.header) as usize;
                        self.payload.clear();
                        self.state = if expected == 0 || expected > MAX_FRAME_SIZE {
                            self.rejected += 1;
                            log::warn!("Link: rejecting frame of {} bytes", expected);
                            DecoderState::Discarding { remaining: expected }
                        } else {
                            DecoderState::ReadingPayload { expected }
                        };
                    }
                }
                DecoderState::ReadingPayload { expected } => {
                    let take = (*expected - self.payload.len()).min(available);
                    // Fits: `expected` is bounded by the buffer capacity.
                    let _ = self.payload.extend_from_slice(&data[offset..offset + take]);
                    offset += take;
                    if self.payload.len() == *expected {
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        return (offset, Some(self.payload.as_slice()));
                    }
                }
                DecoderState::Discarding { remaining } => {
                    let take = (*remaining).min(available);
                    *remaining -= take;
                    offset += take;
                    if *remaining == 0 {
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                    }
                }
            }
        }
        if let DecoderState::Discarding { remaining: 0 } = self.state {
            self.state = DecoderState::ReadingHeader { collected: 0 };
        }
        (offset, None)
    }

    /// Frames refused for an invalid length.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Drop any partial frame (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload.clear();
    }
}

/// Write `[LE-u32 length][payload]` into `out`.  Returns the frame size.
pub fn encode_frame(payload: &[u8], out: &mut [u8]) -> Option<usize> {
    let total = HEADER_SIZE + payload.len();
    if payload.is_empty() || payload.len() > MAX_FRAME_SIZE || total > out.len() {
        return None;
    }
    out[..HEADER_SIZE].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    out[HEADER_SIZE..total].copy_from_slice(payload);
    Some(total)
}

/// Serialize `message` and append it to `out` as one frame.
pub fn encode_message<T: Serialize>(message: &T, out: &mut Vec<u8>) -> Result<()> {
    let payload = postcard::to_allocvec(message).map_err(|_| Error::Codec("serialize failed"))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::Codec("message exceeds frame size"));
    }
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(())
}

/// Deserialize one frame payload.
pub fn decode_message<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    postcard::from_bytes(payload).map_err(|_| Error::Codec("malformed payload"))
}
