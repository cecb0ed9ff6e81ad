//! Transport abstraction: any byte-oriented channel to the host.
//!
//! Concrete implementations:
//! - UART serial (USB CDC on ESP32-S3), provided by the board bring-up
//! - [`MemoryTransport`]: in-process loopback for tests and simulation
//! - [`NullTransport`]: discards output, never receives
//!
//! [`HostLink`](super::HostLink) is generic over `Transport`, so a new
//! channel needs no changes to the framing or command logic.

use std::collections::VecDeque;

/// Byte-oriented, non-blocking transport channel.
pub trait Transport {
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes.  Returns 0 if nothing is available.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write as much of `data` as the channel accepts right now.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Discards all writes and never reads.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = core::convert::Infallible;

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// In-memory transport.  The test side queues bytes with [`feed`](Self::feed)
/// and inspects what the device wrote with [`take_written`](Self::take_written).
#[derive(Debug, Default)]
pub struct MemoryTransport {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    /// Bytes still accepted before writes stall; `None` is unlimited.
    write_budget: Option<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `budget` bytes in total, then stall, to exercise backpressure.
    pub fn with_write_budget(budget: usize) -> Self {
        Self {
            write_budget: Some(budget),
            ..Self::default()
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.tx)
    }

    pub fn set_write_budget(&mut self, budget: Option<usize>) {
        self.write_budget = budget;
    }
}

impl Transport for MemoryTransport {
    type Error = core::convert::Infallible;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        let n = self.write_budget.map_or(data.len(), |b| b.min(data.len()));
        if let Some(budget) = &mut self.write_budget {
            *budget -= n;
        }
        self.tx.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
