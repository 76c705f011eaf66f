mod cli;
mod logging;
mod monitor;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pidlink_core::prelude::*;
use pidlink_core::protocol::list_ports;

use cli::{Cli, Command};

/// Port name used for the simulated controller
const DEMO_PORT: &str = "demo";

fn resolve_port(arg: Option<String>, settings: &Settings) -> Result<String> {
    match arg {
        Some(port) => Ok(port),
        None if !settings.connection.port_name.is_empty() => {
            Ok(settings.connection.port_name.clone())
        }
        None => bail!("no serial port given; pass one or set connection.port_name in the settings file"),
    }
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        eprintln!("No serial ports found");
        return;
    }
    for port in ports {
        println!("{}", port.describe());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("reading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    tracing::debug!("Settings: {:?}", settings);

    match cli.command {
        Command::Ports => print_ports(),

        Command::Monitor {
            port,
            demo,
            max_line_len,
        } => {
            let mut config = settings.connection.clone();
            if let Some(limit) = max_line_len {
                config.max_line_len = limit;
            }

            let mut conn;
            let samples = if demo {
                config.port_name = DEMO_PORT.to_string();
                conn = Connection::new(config);
                conn.connect_with_link(Box::new(DemoController::new().with_glitch_rate(0.01)))?
            } else {
                config.port_name = resolve_port(port, &settings)?;
                conn = Connection::new(config);
                conn.connect()
                    .with_context(|| format!("connecting to {}", conn.config().port_name))?
            };
            tracing::info!("Connected to {}", conn.config().port_name);

            let console = monitor::spawn_console()?;
            monitor::run(conn, samples, settings.tuning, console).await?;
        }

        Command::Send {
            port,
            kp,
            ki,
            kd,
            setpoint,
        } => {
            // Validate before touching the port
            let params = TuningParams::parse(&kp, &ki, &kd, &setpoint)?;

            let mut config = settings.connection.clone();
            config.port_name = resolve_port(port, &settings)?;
            let mut conn = Connection::new(config);
            let _samples = conn
                .connect()
                .with_context(|| format!("connecting to {}", conn.config().port_name))?;

            conn.send(&params)?;
            println!(
                "Sent kp={} ki={} kd={} setpoint={} to {}",
                params.kp,
                params.ki,
                params.kd,
                params.setpoint,
                conn.config().port_name
            );
            conn.disconnect()?;
        }
    }

    Ok(())
}
