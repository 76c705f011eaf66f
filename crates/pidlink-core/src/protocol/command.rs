//! Tuning command frames
//!
//! Frame layout, 16 bytes, no header or checksum:
//! - bytes 0..4   Kp        (f32, little-endian)
//! - bytes 4..8   Ki        (f32, little-endian)
//! - bytes 8..12  Kd        (f32, little-endian)
//! - bytes 12..16 Setpoint  (f32, little-endian)

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::{BridgeError, PortSession, FRAME_LEN};

/// The four values pushed to the controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningParams {
    /// Proportional gain
    pub kp: f32,
    /// Integral gain
    pub ki: f32,
    /// Derivative gain
    pub kd: f32,
    /// Target distance
    pub setpoint: f32,
}

impl Default for TuningParams {
    fn default() -> Self {
        Self {
            kp: 7.12,
            ki: 0.016,
            kd: 25.0,
            setpoint: 24.0,
        }
    }
}

impl TuningParams {
    /// Bundle four values without validation
    pub fn new(kp: f32, ki: f32, kd: f32, setpoint: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            setpoint,
        }
    }

    /// Parse four user-entered strings
    ///
    /// Each must be a finite number that also fits in an f32. The first
    /// offending field is reported.
    pub fn parse(kp: &str, ki: &str, kd: &str, setpoint: &str) -> Result<Self, BridgeError> {
        Ok(Self {
            kp: parse_field("kp", kp)?,
            ki: parse_field("ki", ki)?,
            kd: parse_field("kd", kd)?,
            setpoint: parse_field("setpoint", setpoint)?,
        })
    }

    /// Whether every value is finite
    pub fn is_finite(&self) -> bool {
        [self.kp, self.ki, self.kd, self.setpoint]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Encode into a wire frame
    pub fn to_frame(&self) -> [u8; FRAME_LEN] {
        encode_frame(self.kp, self.ki, self.kd, self.setpoint)
    }
}

fn parse_field(name: &'static str, text: &str) -> Result<f32, BridgeError> {
    let invalid = || BridgeError::InvalidParameter {
        name,
        value: text.to_string(),
    };
    let value: f32 = text.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }
    Ok(value)
}

/// Lay out Kp, Ki, Kd and setpoint as four little-endian f32
pub fn encode_frame(kp: f32, ki: f32, kd: f32, setpoint: f32) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    LittleEndian::write_f32_into(&[kp, ki, kd, setpoint], &mut frame);
    frame
}

/// Read a frame back into its four values
pub fn decode_frame(frame: &[u8; FRAME_LEN]) -> TuningParams {
    let mut values = [0f32; 4];
    LittleEndian::read_f32_into(frame, &mut values);
    TuningParams::new(values[0], values[1], values[2], values[3])
}

/// Encode and write one frame. Fire-and-forget: nothing is read back.
pub fn send(session: &PortSession, params: &TuningParams) -> Result<(), BridgeError> {
    if !params.is_finite() {
        return Err(BridgeError::InvalidParameter {
            name: "params",
            value: format!("{:?}", params),
        });
    }

    let frame = params.to_frame();
    tracing::debug!(
        "send: kp={} ki={} kd={} setpoint={} -> {:02x?}",
        params.kp,
        params.ki,
        params.kd,
        params.setpoint,
        frame
    );
    session.write(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_word_is_kp() {
        let frame = encode_frame(7.12, 0.016, 25.0, 24.0);
        assert_eq!(frame.len(), 16);
        assert_eq!(LittleEndian::read_f32(&frame[0..4]), 7.12f32);
        assert_eq!(LittleEndian::read_f32(&frame[12..16]), 24.0f32);
    }

    #[test]
    fn test_known_bytes() {
        // 1.0f32 = 0x3f800000, -2.0f32 = 0xc0000000
        let frame = encode_frame(1.0, -2.0, 0.0, 0.5);
        assert_eq!(
            frame,
            [
                0x00, 0x00, 0x80, 0x3f, //
                0x00, 0x00, 0x00, 0xc0, //
                0x00, 0x00, 0x00, 0x00, //
                0x00, 0x00, 0x00, 0x3f,
            ]
        );
    }

    fn assert_bit_exact(params: TuningParams) {
        let back = decode_frame(&params.to_frame());
        assert_eq!(back.kp.to_bits(), params.kp.to_bits(), "kp of {:?}", params);
        assert_eq!(back.ki.to_bits(), params.ki.to_bits(), "ki of {:?}", params);
        assert_eq!(back.kd.to_bits(), params.kd.to_bits(), "kd of {:?}", params);
        assert_eq!(
            back.setpoint.to_bits(),
            params.setpoint.to_bits(),
            "setpoint of {:?}",
            params
        );
    }

    #[test]
    fn test_decode_is_bit_exact() {
        assert_bit_exact(TuningParams::new(7.12, 0.016, 25.0, -0.0));
        assert_bit_exact(TuningParams::default());
    }

    #[test]
    fn test_decode_is_bit_exact_at_f32_extremes() {
        let subnormal = f32::from_bits(1);
        assert!(subnormal.is_subnormal());

        assert_bit_exact(TuningParams::new(f32::MAX, f32::MIN, f32::MIN_POSITIVE, subnormal));
        assert_bit_exact(TuningParams::new(-subnormal, -f32::MIN_POSITIVE, -1.5, -24.0));
        assert_bit_exact(TuningParams::new(f32::EPSILON, 0.0, -0.0, 1.0e-30));
        assert_bit_exact(TuningParams::new(-7.12, -0.016, -25.0, 16_777_216.0));
    }

    #[test]
    fn test_parse_valid() {
        let params = TuningParams::parse("7.12", " 0.016 ", "25", "24").unwrap();
        assert_eq!(params, TuningParams::default());
    }

    #[test]
    fn test_parse_rejects_text() {
        let err = TuningParams::parse("7.12", "abc", "25", "24").unwrap_err();
        match err {
            BridgeError::InvalidParameter { name, value } => {
                assert_eq!(name, "ki");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_empty_and_non_finite() {
        assert!(TuningParams::parse("", "0", "0", "0").is_err());
        assert!(TuningParams::parse("0", "0", "nan", "0").is_err());
        assert!(TuningParams::parse("0", "0", "0", "inf").is_err());
        // Finite as f64 but overflows f32
        assert!(TuningParams::parse("1e39", "0", "0", "0").is_err());
    }

    #[test]
    fn test_default_matches_factory_values() {
        let params = TuningParams::default();
        assert_eq!(params.kp, 7.12);
        assert_eq!(params.ki, 0.016);
        assert_eq!(params.kd, 25.0);
        assert_eq!(params.setpoint, 24.0);
    }
}
