//! Serial port handling
//!
//! Port discovery and opening for master stations.

use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::debug;

use super::{ProtocolError, HIGH_BAUD_RATE};

/// USB vendor ID of the Silicon Labs bridge in SportIdent stations
pub const SPORTIDENT_VID: u16 = 0x10C4;
/// USB product ID of the SportIdent station bridge
pub const SPORTIDENT_PID: u16 = 0x800A;

/// Information about an available serial port
#[derive(Debug, Clone)]
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

    /// Whether the USB ids match a SportIdent station
    pub fn is_sportident(&self) -> bool {
        self.vid == Some(SPORTIDENT_VID) && self.pid == Some(SPORTIDENT_PID)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, manufacturer, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => (
                Some(usb_info.vid),
                Some(usb_info.pid),
                usb_info.manufacturer,
                usb_info.product,
            ),
            _ => (None, None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            manufacturer,
            product,
        }
    }
}

/// Sort key placing SportIdent stations first, then ttyUSB* and ttyACM*
/// ports by numeric suffix, then everything else by name
fn port_sort_key(port: &PortInfo) -> (u8, usize, String) {
    let basename = port.name.rsplit('/').next().unwrap_or(&port.name);
    let suffix = |rest: &str| rest.parse::<usize>().unwrap_or(usize::MAX);
    if port.is_sportident() {
        let num = basename
            .strip_prefix("ttyUSB")
            .map(suffix)
            .unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        return (1, suffix(rest), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        return (2, suffix(rest), basename.to_string());
    }
    (3, 0, basename.to_string())
}

/// List available serial ports, SportIdent stations first
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Linux-only: device nodes the enumeration API missed
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyUSB") || fname.starts_with("ttyACM") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(port_sort_key);
    v
}

/// Open a port for a master station, 8N1 without flow control
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<SerialStream, ProtocolError> {
    let baud = baud_rate.unwrap_or(HIGH_BAUD_RATE);
    debug!("Opening {} at {} baud", name, baud);

    let stream = tokio_serial::new(name, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()?;

    Ok(stream)
}
