//! Byte transport abstraction

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Byte transport underneath a [`super::PortSession`]
///
/// Implemented by [`SerialChannel`] for real hardware, by the demo
/// controller, and by scripted links in tests.
pub trait SerialLink: Read + Write + Send {
    /// Set timeout for blocking read/write operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Get number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Drop anything buffered on the input side
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Serial port wrapper implementing SerialLink
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialLink for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::other)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }
}
