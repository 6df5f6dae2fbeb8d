//! In-process connection pair.
//!
//! Each end reads what the other end writes. Useful for driving the client
//! against a simulated device in tests, or for bridging to something that is
//! not a serial port.

use std::io;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::Connection;

/// One end of an in-memory byte link.
pub struct MemoryConnection {
    name: String,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    /// Bytes from a received chunk that did not fit the caller's buffer.
    leftover: Vec<u8>,
}

impl MemoryConnection {
    /// Create a connected pair `(host, device)`.
    pub fn pair() -> (MemoryConnection, MemoryConnection) {
        let (host_tx, device_rx) = crossbeam_channel::unbounded();
        let (device_tx, host_rx) = crossbeam_channel::unbounded();
        (
            MemoryConnection::new("memory:host", host_tx, host_rx),
            MemoryConnection::new("memory:device", device_tx, device_rx),
        )
    }

    fn new(name: &str, tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>) -> Self {
        MemoryConnection {
            name: name.to_string(),
            tx,
            rx,
            leftover: Vec::new(),
        }
    }

    /// Write raw bytes without framing, e.g. to simulate line noise.
    pub fn write_raw(&self, bytes: &[u8]) -> io::Result<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer disconnected"))
    }

    fn take_leftover(&mut self, buf: &mut [u8]) -> usize {
        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        n
    }
}

impl Connection for MemoryConnection {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if !self.leftover.is_empty() {
            return Ok(self.take_leftover(buf));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => {
                self.leftover = chunk;
                Ok(self.take_leftover(buf))
            }
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer disconnected",
            )),
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_raw(frame)
    }

    fn try_clone(&self) -> io::Result<Box<dyn Connection>> {
        Ok(Box::new(MemoryConnection::new(
            &self.name,
            self.tx.clone(),
            self.rx.clone(),
        )))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
