//! Port session
//!
//! Exclusive owner of one open controller link. The handle sits behind a
//! single mutex: the telemetry reader locks it for short non-blocking reads,
//! the command path locks it for a whole frame write, and `close` takes it
//! last, so an in-flight frame always completes before the handle drops.

use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use super::serial::{configure_port, open_port};
use super::stream::{SerialChannel, SerialLink};
use super::{BridgeError, READ_TIMEOUT_MS};

/// Largest single read handed back to the caller
const READ_CHUNK: usize = 512;

/// Identifiers with a live session in this process
fn claimed_ports() -> &'static Mutex<HashSet<String>> {
    static CLAIMED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    CLAIMED.get_or_init(|| Mutex::new(HashSet::new()))
}

fn claim(name: &str) -> Result<(), BridgeError> {
    let mut claimed = claimed_ports()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if !claimed.insert(name.to_string()) {
        return Err(BridgeError::PortUnavailable {
            port: name.to_string(),
            reason: "already open in this process".to_string(),
        });
    }
    Ok(())
}

fn release(name: &str) {
    claimed_ports()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(name);
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// One open connection to the controller
pub struct PortSession {
    name: String,
    link: Mutex<Option<Box<dyn SerialLink>>>,
}

impl PortSession {
    /// Open the named serial device at 9600 baud with a 1 s read timeout
    pub fn open(name: &str) -> Result<Self, BridgeError> {
        claim(name)?;

        let mut port = match open_port(name) {
            Ok(port) => port,
            Err(e) => {
                release(name);
                return Err(BridgeError::PortUnavailable {
                    port: name.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        configure_port(port.as_mut());

        let mut channel = SerialChannel::new(port);
        // Stale bytes from before the open usually hold a partial line
        if let Err(e) = channel.clear_input_buffer() {
            tracing::debug!("open: could not clear input on {}: {}", name, e);
        }

        tracing::info!("Opened {} at {} baud", name, super::BAUD_RATE);
        Ok(Self {
            name: name.to_string(),
            link: Mutex::new(Some(Box::new(channel))),
        })
    }

    /// Wrap an already-open link under `name`
    ///
    /// The same one-session-per-identifier rule applies as for [`PortSession::open`].
    pub fn with_link(name: &str, mut link: Box<dyn SerialLink>) -> Result<Self, BridgeError> {
        claim(name)?;
        if let Err(e) = link.set_timeout(Duration::from_millis(READ_TIMEOUT_MS)) {
            release(name);
            return Err(BridgeError::PortUnavailable {
                port: name.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            link: Mutex::new(Some(link)),
        })
    }

    /// Port identifier this session was opened on
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the handle is still held
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn SerialLink>>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn io_failure(&self, source: io::Error) -> BridgeError {
        BridgeError::IoFailure {
            port: self.name.clone(),
            source,
        }
    }

    /// Return whatever the driver has buffered, without waiting for more
    pub fn read_available(&self) -> Result<Vec<u8>, BridgeError> {
        let mut guard = self.lock();
        let link = guard.as_mut().ok_or(BridgeError::NotConnected)?;

        let available = link.bytes_to_read().map_err(|e| self.io_failure(e))? as usize;
        if available == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; available.min(READ_CHUNK)];
        match link.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if is_timeout(&e) => Ok(Vec::new()),
            Err(e) => Err(self.io_failure(e)),
        }
    }

    /// Read, waiting up to the read timeout if nothing is buffered
    ///
    /// Holds the handle lock for the whole wait, so writers are held off too.
    /// A timeout yields an empty vector.
    pub fn read_blocking(&self) -> Result<Vec<u8>, BridgeError> {
        let mut guard = self.lock();
        let link = guard.as_mut().ok_or(BridgeError::NotConnected)?;

        let mut buf = vec![0u8; READ_CHUNK];
        match link.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if is_timeout(&e) => Ok(Vec::new()),
            Err(e) => Err(self.io_failure(e)),
        }
    }

    /// Write all of `bytes` under the handle lock
    pub fn write(&self, bytes: &[u8]) -> Result<(), BridgeError> {
        let mut guard = self.lock();
        let link = guard.as_mut().ok_or(BridgeError::NotConnected)?;

        link.write_all(bytes)
            .and_then(|_| link.flush())
            .map_err(|e| BridgeError::WriteFailed(format!("{}: {}", self.name, e)))
    }

    /// Release the handle. Safe to call more than once.
    pub fn close(&self) {
        let link = self.lock().take();
        if link.is_some() {
            drop(link);
            release(&self.name);
            tracing::info!("Closed {}", self.name);
        }
    }
}

impl Drop for PortSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PortSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSession")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}
