//! Line reassembly and sample decoding

use thiserror::Error;

/// Why a single telemetry line produced no sample
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Nothing but whitespace
    #[error("empty line")]
    Empty,

    /// Contains bytes outside ASCII
    #[error("line is not ASCII text")]
    NotText,

    /// Text that is not a decimal number
    #[error("'{0}' is not a number")]
    NotNumeric(String),

    /// Parsed to infinity or NaN
    #[error("'{0}' is not finite")]
    NonFinite(String),
}

/// Decode one line (terminators already stripped) into a sample value
pub fn decode_line(line: &[u8]) -> Result<f64, DecodeError> {
    if !line.is_ascii() {
        return Err(DecodeError::NotText);
    }
    let text = std::str::from_utf8(line)
        .map_err(|_| DecodeError::NotText)?
        .trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: f64 = text
        .parse()
        .map_err(|_| DecodeError::NotNumeric(text.to_string()))?;
    if !value.is_finite() {
        return Err(DecodeError::NonFinite(text.to_string()));
    }
    Ok(value)
}

/// Splits a byte stream into `\n`-terminated lines
///
/// Bytes after the last terminator are kept until the next `push`. If more
/// than `max_pending` unterminated bytes pile up they are dropped, along with
/// the rest of that line up to the next `\n`.
#[derive(Debug)]
pub struct LineAssembler {
    buffer: Vec<u8>,
    max_pending: usize,
    /// Skipping the tail of an over-long line
    discarding: bool,
    overflows: u64,
}

impl LineAssembler {
    /// Assembler holding at most `max_pending` unterminated bytes (minimum 1)
    pub fn new(max_pending: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_pending: max_pending.max(1),
            discarding: false,
            overflows: 0,
        }
    }

    /// Feed bytes, returning every line they complete (without `\r\n`)
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();

        for &byte in bytes {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else {
                    let mut line = std::mem::take(&mut self.buffer);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    lines.push(line);
                }
                self.buffer.clear();
                continue;
            }

            if self.discarding {
                continue;
            }

            self.buffer.push(byte);
            if self.buffer.len() > self.max_pending {
                tracing::warn!(
                    "Discarding {} unterminated telemetry bytes (cap {})",
                    self.buffer.len(),
                    self.max_pending
                );
                self.buffer.clear();
                self.discarding = true;
                self.overflows += 1;
            }
        }

        lines
    }

    /// Bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of times the pending cap was hit
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

/// Byte stream in, samples out
///
/// Wraps a [`LineAssembler`] and [`decode_line`], counting skipped lines.
#[derive(Debug)]
pub struct TelemetryDecoder {
    lines: LineAssembler,
    skipped: u64,
}

impl TelemetryDecoder {
    /// Decoder whose lines are capped at `max_line_len` bytes
    pub fn new(max_line_len: usize) -> Self {
        Self {
            lines: LineAssembler::new(max_line_len),
            skipped: 0,
        }
    }

    /// Feed raw bytes and collect the samples they complete, in wire order
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<f64> {
        let mut samples = Vec::new();
        for line in self.lines.push(bytes) {
            match decode_line(&line) {
                Ok(value) => samples.push(value),
                Err(e) => {
                    self.skipped += 1;
                    tracing::debug!("Skipping telemetry line: {}", e);
                }
            }
        }
        samples
    }

    /// Lines that produced no sample
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Over-long lines discarded so far
    pub fn overflows(&self) -> u64 {
        self.lines.overflows()
    }

    /// Bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.lines.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_line_values() {
        assert_eq!(decode_line(b"24.50"), Ok(24.5));
        assert_eq!(decode_line(b"-3"), Ok(-3.0));
        assert_eq!(decode_line(b" 23.87 "), Ok(23.87));
        assert_eq!(decode_line(b"1e2"), Ok(100.0));
    }

    #[test]
    fn test_decode_line_failures() {
        assert_eq!(decode_line(b""), Err(DecodeError::Empty));
        assert_eq!(decode_line(b"   "), Err(DecodeError::Empty));
        assert_eq!(
            decode_line(b"abc"),
            Err(DecodeError::NotNumeric("abc".to_string()))
        );
        assert_eq!(decode_line(&[0x32, 0xff, 0x33]), Err(DecodeError::NotText));
        assert_eq!(
            decode_line(b"inf"),
            Err(DecodeError::NonFinite("inf".to_string()))
        );
        assert_eq!(
            decode_line(b"NaN"),
            Err(DecodeError::NonFinite("NaN".to_string()))
        );
    }

    #[test]
    fn test_assembler_strips_terminators() {
        let mut lines = LineAssembler::new(64);
        assert_eq!(
            lines.push(b"1\n2\r\n\r\n"),
            vec![b"1".to_vec(), b"2".to_vec(), Vec::new()]
        );
        assert_eq!(lines.pending(), 0);
    }

    #[test]
    fn test_assembler_keeps_partial_line() {
        let mut lines = LineAssembler::new(64);
        assert!(lines.push(b"24.").is_empty());
        assert_eq!(lines.pending(), 3);
        assert!(lines.push(b"50\r").is_empty());
        assert_eq!(lines.push(b"\n"), vec![b"24.50".to_vec()]);
    }

    #[test]
    fn test_assembler_overflow_resyncs_on_next_newline() {
        let mut lines = LineAssembler::new(4);
        // "123456" trips the cap; "78" is the tail of the same line
        assert!(lines.push(b"123456").is_empty());
        assert_eq!(lines.overflows(), 1);
        assert_eq!(lines.pending(), 0);
        assert!(lines.push(b"78\n").is_empty());
        assert_eq!(lines.push(b"9\n"), vec![b"9".to_vec()]);
    }

    #[test]
    fn test_assembler_cap_is_inclusive() {
        let mut lines = LineAssembler::new(4);
        assert_eq!(lines.push(b"1234\n"), vec![b"1234".to_vec()]);
        assert_eq!(lines.overflows(), 0);
    }

    #[test]
    fn test_decoder_skips_bad_lines() {
        let mut decoder = TelemetryDecoder::new(64);
        let samples = decoder.feed(b"1.0\nabc\r\n\n2.5\n");
        assert_eq!(samples, vec![1.0, 2.5]);
        assert_eq!(decoder.skipped(), 2);
    }

    #[test]
    fn test_decoder_split_and_malformed_lines() {
        let mut decoder = TelemetryDecoder::new(64);
        assert_eq!(decoder.feed(b"24.50\r\n"), vec![24.5]);
        assert!(decoder.feed(b"abc\r\n").is_empty());
        assert!(decoder.feed(b"24.").is_empty());
        assert_eq!(decoder.feed(b"50\r\n"), vec![24.5]);
    }
}
