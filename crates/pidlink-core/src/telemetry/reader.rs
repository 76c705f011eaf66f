//! Telemetry reader thread
//!
//! One dedicated OS thread per open session. Each iteration checks the stop
//! channel, pulls whatever bytes are buffered, and publishes completed
//! samples in wire order. When nothing is buffered the thread waits on the
//! stop channel instead of on the port, so the handle lock is only ever held
//! for non-blocking reads and a stop request is seen immediately.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::line::TelemetryDecoder;
use crate::protocol::{BridgeError, PortSession, DEFAULT_IDLE_POLL_MS, DEFAULT_MAX_LINE_LEN};

/// Reader tuning knobs
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Cap on buffered-but-unterminated bytes
    pub max_line_len: usize,
    /// Wait between polls while the port is quiet
    pub idle_poll: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
            idle_poll: Duration::from_millis(DEFAULT_IDLE_POLL_MS),
        }
    }
}

/// Counters reported when a reader exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderStats {
    /// Raw bytes read from the port
    pub bytes_received: u64,
    /// Samples delivered to the consumer
    pub samples: u64,
    /// Lines that failed to decode
    pub skipped_lines: u64,
    /// Over-long lines discarded
    pub overflows: u64,
}

/// Why the loop ended without an error
enum Exit {
    Stopped,
    ConsumerGone,
}

struct TelemetryReader {
    session: Arc<PortSession>,
    sink: Sender<f64>,
    stop: Receiver<()>,
    decoder: TelemetryDecoder,
    idle_poll: Duration,
    bytes_received: u64,
    samples: u64,
}

impl TelemetryReader {
    fn run(mut self) -> Result<ReaderStats, BridgeError> {
        tracing::info!("Telemetry reader started on {}", self.session.name());

        let outcome = self.poll_loop();
        // Closing here covers every exit path, including I/O failure
        self.session.close();

        let stats = ReaderStats {
            bytes_received: self.bytes_received,
            samples: self.samples,
            skipped_lines: self.decoder.skipped(),
            overflows: self.decoder.overflows(),
        };

        match outcome {
            Ok(Exit::Stopped) => {
                tracing::info!("Telemetry reader stopped: {:?}", stats);
                Ok(stats)
            }
            Ok(Exit::ConsumerGone) => {
                tracing::info!("Telemetry consumer went away, reader exiting: {:?}", stats);
                Ok(stats)
            }
            Err(e) => {
                tracing::warn!("Telemetry reader failed: {}", e);
                Err(e)
            }
        }
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop.try_recv(), Err(TryRecvError::Empty))
    }

    fn poll_loop(&mut self) -> Result<Exit, BridgeError> {
        loop {
            if self.stop_requested() {
                return Ok(Exit::Stopped);
            }

            let bytes = self.session.read_available()?;
            if bytes.is_empty() {
                match self.stop.recv_timeout(self.idle_poll) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(Exit::Stopped),
                }
            }

            self.bytes_received += bytes.len() as u64;
            for value in self.decoder.feed(&bytes) {
                if self.sink.send(value).is_err() {
                    return Ok(Exit::ConsumerGone);
                }
                self.samples += 1;
            }
        }
    }
}

/// Owner-side handle to a running telemetry reader
///
/// Dropping the handle stops the reader and waits for it.
pub struct ReaderHandle {
    port: String,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<Result<ReaderStats, BridgeError>>>,
}

impl ReaderHandle {
    /// Start reading `session` on a new thread, sending samples to `sink`
    pub fn spawn(
        session: Arc<PortSession>,
        sink: Sender<f64>,
        options: ReaderOptions,
    ) -> Result<Self, BridgeError> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let name = session.name().to_string();

        let reader = TelemetryReader {
            session,
            sink,
            stop: stop_rx,
            decoder: TelemetryDecoder::new(options.max_line_len),
            idle_poll: options.idle_poll,
            bytes_received: 0,
            samples: 0,
        };

        let thread = thread::Builder::new()
            .name(format!("telemetry {}", name))
            .spawn(move || reader.run())
            .map_err(|source| BridgeError::IoFailure {
                port: name.clone(),
                source,
            })?;

        Ok(Self {
            port: name,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Whether the reader thread has already exited (stopped or failed)
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Signal the reader, wait for it, and return how it ended
    pub fn stop(mut self) -> Result<ReaderStats, BridgeError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<ReaderStats, BridgeError> {
        if let Some(stop) = self.stop.take() {
            // The reader may already be gone; that is fine
            let _ = stop.send(());
        }
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| {
                Err(BridgeError::IoFailure {
                    port: self.port.clone(),
                    source: std::io::Error::other("telemetry reader panicked"),
                })
            }),
            None => Ok(ReaderStats::default()),
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SerialLink;
    use std::io::{self, Read, Write};

    /// Link that never has data
    struct QuietLink;

    impl Read for QuietLink {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
        }
    }

    impl Write for QuietLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLink for QuietLink {
        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }

        fn bytes_to_read(&mut self) -> io::Result<u32> {
            Ok(0)
        }

        fn clear_input_buffer(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stop_on_quiet_port_closes_session() {
        let session = Arc::new(PortSession::with_link("reader-quiet", Box::new(QuietLink)).unwrap());
        let (tx, rx) = mpsc::channel();
        let handle = ReaderHandle::spawn(session.clone(), tx, ReaderOptions::default()).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        let stats = handle.stop().unwrap();

        assert_eq!(stats, ReaderStats::default());
        assert!(!session.is_open());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_handle_stops_reader() {
        let session = Arc::new(PortSession::with_link("reader-drop", Box::new(QuietLink)).unwrap());
        let (tx, _rx) = mpsc::channel();
        let handle = ReaderHandle::spawn(session.clone(), tx, ReaderOptions::default()).unwrap();
        drop(handle);
        assert!(!session.is_open());
    }

    /// Link whose buffer query panics
    struct PanicLink;

    impl Read for PanicLink {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for PanicLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLink for PanicLink {
        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }

        fn bytes_to_read(&mut self) -> io::Result<u32> {
            panic!("driver fault")
        }

        fn clear_input_buffer(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reader_panic_reports_port_name() {
        let session = Arc::new(PortSession::with_link("reader-panic", Box::new(PanicLink)).unwrap());
        let (tx, _rx) = mpsc::channel();
        let handle = ReaderHandle::spawn(session, tx, ReaderOptions::default()).unwrap();

        match handle.stop() {
            Err(BridgeError::IoFailure { port, .. }) => assert_eq!(port, "reader-panic"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
