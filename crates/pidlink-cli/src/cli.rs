use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pidlink", version, about = "Monitor and tune a PID controller over serial")]
pub struct Cli {
    /// Settings file (JSON) with connection and tuning defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports
    Ports,

    /// Stream telemetry and accept tuning commands on stdin
    Monitor {
        /// Serial port (falls back to the settings file)
        port: Option<String>,

        /// Talk to a simulated controller instead of a serial port
        #[arg(long)]
        demo: bool,

        /// Cap on unterminated telemetry bytes
        #[arg(long)]
        max_line_len: Option<usize>,
    },

    /// Send one tuning frame and exit
    #[command(allow_negative_numbers = true)]
    Send {
        /// Serial port (falls back to the settings file)
        #[arg(short, long)]
        port: Option<String>,

        kp: String,
        ki: String,
        kd: String,
        setpoint: String,
    },
}
