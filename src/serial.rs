//! Buffer transport to the FT240X.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

use crate::protocol::BUFLEN;
use crate::InfnoiseError;

/// One full-buffer round trip with the device.
///
/// `exchange` writes the request and returns exactly [`BUFLEN`] response
/// bytes, or an error. A short response is an error, never a partial
/// buffer.
pub trait Transport {
    fn exchange(&mut self, request: &[u8; BUFLEN]) -> Result<[u8; BUFLEN], InfnoiseError>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(&mut self, request: &[u8; BUFLEN]) -> Result<[u8; BUFLEN], InfnoiseError> {
        (**self).exchange(request)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// FT240X clocking rate in samples per second.
const BAUD_RATE: u32 = 30_000;

/// Serial-port transport for an FT240X running in synchronous echo mode.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Open the device node and drain anything left in its FIFO.
    pub fn open(port_name: &str, timeout: Duration) -> Result<Self, InfnoiseError> {
        let mut port = serialport::new(port_name, BAUD_RATE)
            .timeout(timeout)
            .open()
            .map_err(|e| InfnoiseError::Connection(format!("Failed to open {port_name}: {e}")))?;

        port.clear(serialport::ClearBuffer::All)
            .map_err(|e| InfnoiseError::Connection(format!("Clear buffer failed: {e}")))?;

        log::debug!("opened {port_name} at {BAUD_RATE} baud");
        Ok(Self {
            port: Some(port),
            name: port_name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Transport for SerialTransport {
    fn exchange(&mut self, request: &[u8; BUFLEN]) -> Result<[u8; BUFLEN], InfnoiseError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| InfnoiseError::Transport("Port is closed".into()))?;

        port.write_all(request)
            .map_err(|e| InfnoiseError::Transport(format!("Write failed: {e}")))?;
        port.flush()
            .map_err(|e| InfnoiseError::Transport(format!("Flush failed: {e}")))?;

        let mut buf = [0u8; BUFLEN];
        let mut total = 0;
        while total < BUFLEN {
            match port.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(InfnoiseError::Transport(format!("Read failed: {e}"))),
            }
        }
        if total != BUFLEN {
            return Err(InfnoiseError::Transport(format!(
                "Expected {BUFLEN} bytes, got {total}"
            )));
        }
        Ok(buf)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::debug!("closed {}", self.name);
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}
