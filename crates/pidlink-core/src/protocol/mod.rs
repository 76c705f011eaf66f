//! Serial Protocol Communication
//!
//! Implements both directions of the controller link:
//! - ASCII telemetry, one decimal value per line, controller -> host
//! - 16-byte binary tuning frames, host -> controller
//!
//! The port handle is owned by a [`PortSession`] and shared between the
//! telemetry reader thread and the command path behind a single lock.

pub mod command;
mod connection;
mod error;
pub mod serial;
mod session;
pub mod stream;

pub use command::{decode_frame, encode_frame, send, TuningParams};
pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use error::BridgeError;
pub use serial::{list_ports, PortInfo};
pub use session::PortSession;
pub use stream::{SerialChannel, SerialLink};

/// Fixed baud rate of the controller link
pub const BAUD_RATE: u32 = 9600;

/// Read timeout for explicit blocking reads in milliseconds
pub const READ_TIMEOUT_MS: u64 = 1000;

/// Size of an encoded tuning command frame
pub const FRAME_LEN: usize = 16;

/// Default cap on buffered-but-unterminated telemetry bytes
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

/// Default idle wait between polls when no bytes are buffered
pub const DEFAULT_IDLE_POLL_MS: u64 = 10;
