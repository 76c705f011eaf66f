//! Telemetry
//!
//! Turns the controller's ASCII stream (one decimal value per line) into
//! `f64` samples delivered over a channel.

mod line;
mod reader;

pub use line::{decode_line, DecodeError, LineAssembler, TelemetryDecoder};
pub use reader::{ReaderHandle, ReaderOptions, ReaderStats};
