//! Connection management
//!
//! Ties one [`PortSession`], its telemetry reader and the command path into
//! the connect / send / disconnect lifecycle a front end drives.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use super::{
    command, BridgeError, PortSession, SerialLink, TuningParams, DEFAULT_IDLE_POLL_MS,
    DEFAULT_MAX_LINE_LEN,
};
use crate::telemetry::{ReaderHandle, ReaderOptions, ReaderStats};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Port open and reader running
    Connected,
    /// Reader ended on an I/O failure; reconnect to recover
    Error,
}

/// Connection configuration
///
/// Baud rate and read timeout are fixed, see [`super::BAUD_RATE`] and
/// [`super::READ_TIMEOUT_MS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial port name
    pub port_name: String,
    /// Cap on unterminated telemetry bytes before they are discarded
    pub max_line_len: usize,
    /// Reader wait between polls while the port is quiet, in milliseconds
    pub idle_poll_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
        }
    }
}

impl ConnectionConfig {
    /// Defaults for `port_name`
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// Reader tuning derived from this config
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            max_line_len: self.max_line_len,
            idle_poll: Duration::from_millis(self.idle_poll_ms.max(1)),
        }
    }
}

/// Controller connection
pub struct Connection {
    config: ConnectionConfig,
    state: ConnectionState,
    session: Option<Arc<PortSession>>,
    reader: Option<ReaderHandle>,
    /// Frames written since connect
    frames_sent: u64,
}

impl Connection {
    /// Create a new connection (not yet connected)
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            session: None,
            reader: None,
            frames_sent: 0,
        }
    }

    /// Configuration this connection opens with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Frames written since the last connect
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Open the configured port and start streaming telemetry
    ///
    /// Returns the receiving end of the sample channel.
    pub fn connect(&mut self) -> Result<Receiver<f64>, BridgeError> {
        if self.state == ConnectionState::Connected {
            return Err(BridgeError::AlreadyConnected);
        }
        let session = PortSession::open(&self.config.port_name)?;
        self.attach(session)
    }

    /// Like [`Connection::connect`] but over a caller-supplied link
    pub fn connect_with_link(
        &mut self,
        link: Box<dyn SerialLink>,
    ) -> Result<Receiver<f64>, BridgeError> {
        if self.state == ConnectionState::Connected {
            return Err(BridgeError::AlreadyConnected);
        }
        let session = PortSession::with_link(&self.config.port_name, link)?;
        self.attach(session)
    }

    fn attach(&mut self, session: PortSession) -> Result<Receiver<f64>, BridgeError> {
        let session = Arc::new(session);
        let (tx, rx) = mpsc::channel();
        let reader = ReaderHandle::spawn(session.clone(), tx, self.config.reader_options())?;

        self.session = Some(session);
        self.reader = Some(reader);
        self.frames_sent = 0;
        self.state = ConnectionState::Connected;
        Ok(rx)
    }

    /// Surface a reader that ended on its own
    ///
    /// Returns the reader's error once, moving the connection to
    /// [`ConnectionState::Error`].
    pub fn check_reader(&mut self) -> Result<(), BridgeError> {
        let finished = self.reader.as_ref().is_some_and(|r| r.is_finished());
        if !finished {
            return Ok(());
        }

        let outcome = self.reader.take().map(ReaderHandle::stop);
        self.session = None;
        match outcome {
            Some(Err(e)) => {
                self.state = ConnectionState::Error;
                Err(e)
            }
            _ => {
                self.state = ConnectionState::Disconnected;
                Ok(())
            }
        }
    }

    /// Write one tuning frame
    pub fn send(&mut self, params: &TuningParams) -> Result<(), BridgeError> {
        self.check_reader()?;
        let session = self.session.as_ref().ok_or(BridgeError::NotConnected)?;
        command::send(session, params)?;
        self.frames_sent = self.frames_sent.saturating_add(1);
        Ok(())
    }

    /// Parse four user-entered strings and send them
    ///
    /// Nothing is written if any field fails to parse.
    pub fn send_text(
        &mut self,
        kp: &str,
        ki: &str,
        kd: &str,
        setpoint: &str,
    ) -> Result<TuningParams, BridgeError> {
        let params = TuningParams::parse(kp, ki, kd, setpoint)?;
        self.send(&params)?;
        Ok(params)
    }

    /// Stop the reader and close the port
    pub fn disconnect(&mut self) -> Result<ReaderStats, BridgeError> {
        let outcome = match self.reader.take() {
            Some(reader) => reader.stop(),
            None => Ok(ReaderStats::default()),
        };
        // The reader closes the session on exit; this covers a failed spawn
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.state = ConnectionState::Disconnected;
        outcome
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
