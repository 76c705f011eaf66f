//! Interactive monitor
//!
//! Prints numbered samples on stdout while reading tuning commands from
//! stdin. Samples are drained on a blocking task; the console, the health
//! check and Ctrl-C are multiplexed on the main task.

use anyhow::{Context, Result};
use pidlink_core::prelude::*;
use std::io::BufRead;
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

const HELP: &str = "commands: send <kp> <ki> <kd> <setpoint> | resend | status | help | quit";

/// One line typed at the monitor prompt
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Send(TuningParams),
    Resend,
    Status,
    Help,
    Quit,
}

/// Parse a console line; blank lines yield `None`
pub fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (verb.to_ascii_lowercase().as_str(), args) {
        ("send", [kp, ki, kd, setpoint]) => ConsoleCommand::Send(
            TuningParams::parse(kp, ki, kd, setpoint).map_err(|e| e.to_string())?,
        ),
        ("send", _) => return Err("usage: send <kp> <ki> <kd> <setpoint>".to_string()),
        ("resend", []) => ConsoleCommand::Resend,
        ("status", []) => ConsoleCommand::Status,
        ("help" | "?", []) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        _ => return Err(format!("unknown command '{}'; {}", line.trim(), HELP)),
    };
    Ok(Some(command))
}

/// Forward stdin lines from a dedicated thread
///
/// The thread is detached: a read blocked on stdin must never hold up
/// shutdown, and it ends with the process.
pub fn spawn_console() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(16);
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Reading stdin failed: {}", e);
                        break;
                    }
                }
            }
        })
        .context("starting console thread")?;
    Ok(rx)
}

/// One-line summary printed when the monitor exits
///
/// `stats` is `None` when the reader's counters were lost with its failure.
pub fn summary(series: &SampleSeries, stats: Option<&ReaderStats>) -> String {
    let mut text = format!("{} samples", series.total());
    if let Some(stats) = stats {
        text.push_str(&format!(" ({} lines skipped)", stats.skipped_lines));
    }
    if let Some((lo, hi)) = series.range() {
        text.push_str(&format!(", range {:.2}..{:.2}", lo, hi));
    }
    text
}

/// Run until Ctrl-C, `quit`, or a reader failure
///
/// `console` carries typed lines; once it closes the monitor keeps
/// streaming until Ctrl-C or a reader failure.
pub async fn run(
    mut conn: Connection,
    samples: Receiver<f64>,
    tuning: TuningParams,
    mut console: mpsc::Receiver<String>,
) -> Result<()> {
    let printer = tokio::task::spawn_blocking(move || {
        let mut series = SampleSeries::default();
        for value in samples {
            let point = series.push(value);
            println!("{:>8}  {:>10.2}", point.index, point.value);
        }
        series
    });

    eprintln!("{}", HELP);
    let mut console_open = true;
    let mut health = tokio::time::interval(Duration::from_millis(500));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_sent = tuning;
    // Set once the reader has been collected outside `disconnect`
    let mut reader_failed = false;

    let outcome: Result<()> = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            _ = health.tick() => {
                if let Err(e) = conn.check_reader() {
                    reader_failed = true;
                    break Err(e).context("telemetry reader stopped");
                }
            }
            line = console.recv(), if console_open => {
                let Some(line) = line else {
                    tracing::debug!("Console closed; streaming until Ctrl-C");
                    console_open = false;
                    continue;
                };

                let params = match parse_console_line(&line) {
                    Ok(None) => continue,
                    Ok(Some(ConsoleCommand::Quit)) => break Ok(()),
                    Ok(Some(ConsoleCommand::Help)) => {
                        eprintln!("{}", HELP);
                        continue;
                    }
                    Ok(Some(ConsoleCommand::Status)) => {
                        eprintln!(
                            "{} {:?}, frames sent: {}, tuning: {:?}",
                            conn.config().port_name,
                            conn.state(),
                            conn.frames_sent(),
                            last_sent
                        );
                        continue;
                    }
                    Ok(Some(ConsoleCommand::Send(params))) => params,
                    Ok(Some(ConsoleCommand::Resend)) => last_sent,
                    Err(msg) => {
                        eprintln!("{}", msg);
                        continue;
                    }
                };

                match conn.send(&params) {
                    Ok(()) => {
                        tracing::info!(
                            "Sent kp={} ki={} kd={} setpoint={}",
                            params.kp, params.ki, params.kd, params.setpoint
                        );
                        last_sent = params;
                    }
                    Err(e) if e.is_fatal() => {
                        reader_failed = true;
                        break Err(e).context("send failed");
                    }
                    Err(e) => tracing::warn!("Send failed: {}", e),
                }
            }
        }
    };

    let stats = match conn.disconnect() {
        Ok(stats) if !reader_failed => Some(stats),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Reader ended with error: {}", e);
            None
        }
    };
    let series = printer.await.context("sample printer task")?;
    eprintln!("{}", summary(&series, stats.as_ref()));

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use pidlink_core::protocol::SerialLink;
    use std::io::{self, Read, Write};

    /// Link that fails as soon as the reader polls it
    struct UnpluggedLink;

    impl Read for UnpluggedLink {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    impl Write for UnpluggedLink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLink for UnpluggedLink {
        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }

        fn bytes_to_read(&mut self) -> io::Result<u32> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }

        fn clear_input_buffer(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_returns_on_quit() {
        let mut conn = Connection::new(ConnectionConfig::new("monitor-quit"));
        let samples = conn
            .connect_with_link(Box::new(DemoController::with_seed(5)))
            .unwrap();
        let (tx, console) = mpsc::channel(4);
        tx.send("status".to_string()).await.unwrap();
        tx.send("send 1 0 0 20".to_string()).await.unwrap();
        tx.send("quit".to_string()).await.unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            run(conn, samples, TuningParams::default(), console),
        )
        .await
        .expect("monitor should return after quit");
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn test_run_returns_on_reader_failure_with_console_open() {
        let mut conn = Connection::new(ConnectionConfig::new("monitor-unplugged"));
        let samples = conn.connect_with_link(Box::new(UnpluggedLink)).unwrap();
        // Sender stays alive so the console never closes
        let (_tx, console) = mpsc::channel::<String>(4);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            run(conn, samples, TuningParams::default(), console),
        )
        .await
        .expect("monitor should return after the reader fails");
        let err = outcome.unwrap_err();
        assert!(
            format!("{:#}", err).contains("telemetry reader stopped"),
            "{:#}",
            err
        );
    }

    #[test]
    fn test_summary_without_reader_stats() {
        let mut series = SampleSeries::default();
        series.extend([23.5, 24.25, 24.0]);
        assert_eq!(summary(&series, None), "3 samples, range 23.50..24.25");
    }

    #[test]
    fn test_summary_with_reader_stats() {
        let mut series = SampleSeries::default();
        series.push(12.0);
        let stats = ReaderStats {
            samples: 1,
            skipped_lines: 2,
            ..ReaderStats::default()
        };
        assert_eq!(
            summary(&series, Some(&stats)),
            "1 samples (2 lines skipped), range 12.00..12.00"
        );
        assert_eq!(summary(&SampleSeries::default(), Some(&stats)), "0 samples (2 lines skipped)");
    }

    #[test]
    fn test_parse_send() {
        assert_eq!(
            parse_console_line("send 7.12 0.016 25 24"),
            Ok(Some(ConsoleCommand::Send(TuningParams::default())))
        );
        assert_eq!(
            parse_console_line("  SEND 1 2 3 4 "),
            Ok(Some(ConsoleCommand::Send(TuningParams::new(1.0, 2.0, 3.0, 4.0))))
        );
    }

    #[test]
    fn test_parse_send_errors() {
        assert!(parse_console_line("send 1 2 3").is_err());
        let err = parse_console_line("send 1 2 x 4").unwrap_err();
        assert!(err.contains("kd"), "{}", err);
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(parse_console_line(""), Ok(None));
        assert_eq!(parse_console_line("   "), Ok(None));
        assert_eq!(parse_console_line("resend"), Ok(Some(ConsoleCommand::Resend)));
        assert_eq!(parse_console_line("status"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(parse_console_line("?"), Ok(Some(ConsoleCommand::Help)));
        assert_eq!(parse_console_line("exit"), Ok(Some(ConsoleCommand::Quit)));
        assert!(parse_console_line("status now").is_err());
        assert!(parse_console_line("reboot").is_err());
    }
}
