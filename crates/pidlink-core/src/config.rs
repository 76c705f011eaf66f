//! Settings file
//!
//! JSON document holding the last-used connection settings and tuning
//! values, e.g.
//!
//! ```json
//! {
//!   "connection": { "port_name": "/dev/ttyUSB0", "max_line_len": 256 },
//!   "tuning": { "kp": 7.12, "ki": 0.016, "kd": 25.0, "setpoint": 24.0 }
//! }
//! ```
//!
//! Missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::protocol::{ConnectionConfig, TuningParams};

/// Persisted bridge settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Port and reader settings
    pub connection: ConnectionConfig,
    /// Tuning sent by `resend` before anything else is entered
    pub tuning: TuningParams,
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse settings from JSON text
    pub fn from_json(content: &str) -> io::Result<Self> {
        let settings: Settings = serde_json::from_str(content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if !settings.tuning.is_finite() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "tuning values must be finite",
            ));
        }
        Ok(settings)
    }

    /// Write settings as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_document_uses_defaults() {
        let settings = Settings::from_json(r#"{"tuning": {"kp": 2.5}}"#).unwrap();
        assert_eq!(settings.tuning.kp, 2.5);
        assert_eq!(settings.tuning.ki, TuningParams::default().ki);
        assert_eq!(settings.connection, ConnectionConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("pidlink.json");

        let mut settings = Settings::default();
        settings.connection.port_name = "/dev/ttyACM0".to_string();
        settings.tuning.setpoint = 30.0;
        settings.save(&path).unwrap();

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = Settings::from_json("{ not json").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = Settings::load(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
