//! Serial port handling
//!
//! Port discovery and low-level open/configure for the controller link.

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits};
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::{BAUD_RATE, READ_TIMEOUT_MS};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }

    /// Short human-readable description for port pickers
    pub fn describe(&self) -> String {
        match (&self.product, self.vid, self.pid) {
            (Some(product), Some(vid), Some(pid)) => {
                format!("{} ({}) [{:04x}:{:04x}]", self.name, product, vid, pid)
            }
            (Some(product), _, _) => format!("{} ({})", self.name, product),
            _ => self.name.clone(),
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Sort key so that:
///  - ttyACM* ports come first (numeric suffix order)
///  - then ttyUSB* ports
///  - then COM* ports
///  - then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    let prefixes = ["ttyACM", "ttyUSB", "COM"];
    for (rank, prefix) in prefixes.iter().enumerate() {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank as u8, num, basename.to_string());
        }
    }
    (prefixes.len() as u8, 0, basename.to_string())
}

/// USB CDC and USB-serial device nodes directly under `dir`
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn usb_serial_nodes(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with("ttyACM") || n.starts_with("ttyUSB"))
        })
        .map(|entry| entry.path().display().to_string())
        .collect()
}

fn add_unique(ports: &mut Vec<PortInfo>, port: PortInfo) {
    if !ports.iter().any(|p| p.name == port.name) {
        ports.push(port);
    }
}

/// Ports the controller could be on, USB CDC adapters first
///
/// On Linux, device nodes the enumeration API missed are added by name.
pub fn list_ports() -> Vec<PortInfo> {
    let enumerated = serialport::available_ports().unwrap_or_else(|e| {
        tracing::debug!("Port enumeration failed: {}", e);
        Vec::new()
    });

    let mut ports = Vec::with_capacity(enumerated.len());
    for info in enumerated {
        add_unique(&mut ports, PortInfo::from(info));
    }

    #[cfg(target_os = "linux")]
    for name in usb_serial_nodes(Path::new("/dev")) {
        add_unique(&mut ports, PortInfo::bare(name));
    }

    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// Open a serial port at the controller's fixed line settings (9600 8N1, 1 s timeout)
pub fn open_port(name: &str) -> Result<Box<dyn SerialPort>, serialport::Error> {
    serialport::new(name, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(READ_TIMEOUT_MS))
        .open()
}

/// Assert the modem control lines after open
///
/// Failures here are logged and ignored; some USB bridges do not implement them.
pub fn configure_port(port: &mut dyn SerialPort) {
    if let Err(e) = port.write_data_terminal_ready(true) {
        tracing::debug!("configure_port: failed to set DTR high: {} (continuing)", e);
    }
    if let Err(e) = port.write_request_to_send(true) {
        tracing::debug!("configure_port: failed to set RTS high: {} (continuing)", e);
    }
}
