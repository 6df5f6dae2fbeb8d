//! Byte-oriented connections the client can drive.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

use crate::{ClientConfig, ConnectionError};

/// A bidirectional byte link to the device.
///
/// The client holds two handles to the same link (see
/// [`try_clone`](Self::try_clone)): one only writes, the other only reads.
pub trait Connection: Send {
    /// Read up to `buf.len()` bytes, blocking for at most `timeout`.
    /// Returns `Ok(0)` when nothing arrived in time.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write one complete frame and flush it.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Open a second handle to the same link.
    fn try_clone(&self) -> io::Result<Box<dyn Connection>>;

    /// Name used in log output.
    fn name(&self) -> &str;
}

/// Whether an I/O error just means "no data yet".
pub(crate) fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ============================================================================
// Serial Port
// ============================================================================

/// A serial port opened through the `serialport` crate.
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    name: String,
    /// Timeout currently programmed into the port.
    timeout: Duration,
}

impl SerialConnection {
    /// Open and configure the port named in `config`.
    pub fn open(config: &ClientConfig) -> Result<Self, ConnectionError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| ConnectionError::Open {
                port: config.port.clone(),
                source,
            })?;
        debug!(
            port = %config.port,
            baud_rate = config.baud_rate,
            "opened serial port"
        );
        Ok(SerialConnection {
            port,
            name: config.port.clone(),
            timeout: config.read_timeout,
        })
    }
}

impl Connection for SerialConnection {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if timeout != self.timeout {
            self.port.set_timeout(timeout).map_err(io::Error::from)?;
            self.timeout = timeout;
        }
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_idle(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()
    }

    fn try_clone(&self) -> io::Result<Box<dyn Connection>> {
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(SerialConnection {
            port,
            name: self.name.clone(),
            timeout: self.timeout,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
