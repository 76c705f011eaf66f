//! # PIDLink Core Library
//!
//! Serial bridge between a host application and an embedded PID controller.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

//!
//! This library provides:
//! - Port sessions at the controller's fixed line settings (9600 baud, 1 s timeout)
//! - A background telemetry reader turning ASCII lines into `f64` samples
//! - Encoding of Kp/Ki/Kd/setpoint into 16-byte little-endian command frames
//! - A consumer-side sample series and a simulated controller for demo mode
//!
//! ## Example
//!
//! ```rust,ignore
//! use pidlink_core::protocol::{Connection, ConnectionConfig, TuningParams};
//!
//! let mut conn = Connection::new(ConnectionConfig::new("/dev/ttyUSB0"));
//! let samples = conn.connect()?;
//!
//! conn.send(&TuningParams::new(7.12, 0.016, 25.0, 24.0))?;
//! for value in samples.iter().take(10) {
//!     println!("distance: {value}");
//! }
//! conn.disconnect()?;
//! ```

pub mod config;
pub mod demo;
pub mod protocol;
pub mod series;
pub mod telemetry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::demo::DemoController;
    pub use crate::protocol::{
        BridgeError, Connection, ConnectionConfig, ConnectionState, PortSession, TuningParams,
    };
    pub use crate::series::{SamplePoint, SampleSeries};
    pub use crate::telemetry::{ReaderHandle, ReaderOptions, ReaderStats};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
