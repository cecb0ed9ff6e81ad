//! Framed binary host link.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       Host link                            │
//! │                                                            │
//! │  OutputRecord ─┐                                           │
//! │  HostReply ────┴─▶ DeviceMessage ─▶ postcard ─▶ frame ─▶ tx│
//! │                                                            │
//! │  rx ─▶ FrameDecoder ─▶ postcard ─▶ HostCommand ─▶ poll     │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`HostLink`] implements [`HostPort`] over any [`Transport`].  Outgoing
//! frames go through a bounded staging buffer: while a previous frame is
//! still partly unsent, `send` refuses new records so they stay in the
//! output channel instead of being lost.

pub mod codec;
pub mod transport;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::app::commands::{HostCommand, HostReply};
use crate::app::ports::HostPort;
use crate::output::OutputRecord;
use codec::{decode_message, encode_message, FrameDecoder};
use transport::Transport;

/// Everything the device sends to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceMessage {
    Record(OutputRecord),
    Reply(HostReply),
}

const READ_CHUNK: usize = 64;

/// [`HostPort`] speaking length-prefixed postcard frames over a transport.
pub struct HostLink<T: Transport> {
    transport: T,
    decoder: FrameDecoder,
    /// Received bytes not yet run through the decoder.
    rx: Vec<u8>,
    /// Encoded bytes not yet accepted by the transport.
    tx: Vec<u8>,
    malformed: u32,
}

impl<T: Transport> HostLink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(),
            rx: Vec::new(),
            tx: Vec::new(),
            malformed: 0,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Command frames that failed to decode.
    pub fn malformed(&self) -> u32 {
        self.malformed
    }

    /// Bytes staged but not yet written.
    pub fn backlog(&self) -> usize {
        self.tx.len()
    }

    /// Push staged bytes into the transport.  Returns `true` when empty.
    pub fn flush(&mut self) -> bool {
        while !self.tx.is_empty() {
            match self.transport.write(&self.tx) {
                Ok(0) => break,
                Ok(n) => {
                    self.tx.drain(..n);
                }
                Err(e) => {
                    warn!("Link: write failed: {:?}", e);
                    break;
                }
            }
        }
        if self.tx.is_empty() {
            if let Err(e) = self.transport.flush() {
                warn!("Link: flush failed: {:?}", e);
            }
        }
        self.tx.is_empty()
    }

    fn queue(&mut self, message: &DeviceMessage) {
        if let Err(e) = encode_message(message, &mut self.tx) {
            warn!("Link: dropping unencodable message: {}", e);
            return;
        }
        self.flush();
    }

    fn fill_rx(&mut self) {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.transport.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    warn!("Link: read failed: {:?}", e);
                    break;
                }
            }
        }
    }
}

impl<T: Transport> HostPort for HostLink<T> {
    fn send(&mut self, record: &OutputRecord) -> bool {
        if !self.flush() {
            return false;
        }
        self.queue(&DeviceMessage::Record(record.clone()));
        true
    }

    fn poll_command(&mut self) -> Option<HostCommand> {
        self.fill_rx();
        while !self.rx.is_empty() {
            let (used, frame) = self.decoder.decode(&self.rx);
            let decoded = frame.map(decode_message::<HostCommand>);
            self.rx.drain(..used);
            match decoded {
                Some(Ok(command)) => return Some(command),
                Some(Err(e)) => {
                    self.malformed += 1;
                    warn!("Link: {}", e);
                }
                None => break,
            }
        }
        None
    }

    fn reply(&mut self, reply: &HostReply) {
        self.queue(&DeviceMessage::Reply(reply.clone()));
    }
}
