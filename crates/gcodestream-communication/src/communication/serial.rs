//! Serial port transport
//!
//! Provides direct hardware connection to CNC controllers via USB or RS-232.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Baud rate, parity, and stop bit configuration
//! - A background reader thread that assembles lines and hands them to the
//!   transport callback

use crate::communication::{
    ConnectionDriver, ConnectionParams, SerialParity, Transport, TransportCallback, TransportEvent,
};
use gcodestream_core::{ConnectionError, Error, Result};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            vid: None,
            pid: None,
        }
    }
}

impl std::fmt::Display for SerialPortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.port_name, self.description)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " [{:04x}:{:04x}]", vid, pid)?;
        }
        Ok(())
    }
}

/// List available serial ports that look like CNC controllers
///
/// - Windows: COM*
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_valid_cnc_port(&port.port_name))
        .map(|port| {
            let mut info = SerialPortInfo::new(&port.port_name, get_port_description(port));
            if let serialport::SerialPortType::UsbPort(usb_info) = &port.port_type {
                info.vid = Some(usb_info.vid);
                info.pid = Some(usb_info.pid);
                info.manufacturer = usb_info.manufacturer.clone();
            }
            info
        })
        .collect())
}

fn is_valid_cnc_port(port_name: &str) -> bool {
    if let Some(num) = port_name.strip_prefix("COM") {
        return !num.is_empty() && num.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Splits a byte stream into lines
///
/// Lines end at `\n`; a trailing `\r` is stripped and blank lines are dropped.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: Vec<u8>,
}

impl LineAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                let raw = std::mem::take(&mut self.buffer);
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches('\r').trim();
                if !line.is_empty() {
                    lines.push(line.to_string());
                }
            } else {
                self.buffer.push(b);
            }
        }
        lines
    }
}

/// Transport over a serial port
pub struct SerialTransport {
    writer: Option<Box<dyn serialport::SerialPort>>,
    running: Arc<AtomicBool>,
    port_name: String,
}

impl SerialTransport {
    /// Create a closed serial transport
    pub fn new() -> Self {
        Self {
            writer: None,
            running: Arc::new(AtomicBool::new(false)),
            port_name: String::new(),
        }
    }

    fn open(params: &ConnectionParams) -> Result<Box<dyn serialport::SerialPort>> {
        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(ConnectionError::InvalidParameters {
                    reason: format!("Invalid data bits: {}", other),
                }
                .into())
            }
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(ConnectionError::InvalidParameters {
                    reason: format!("Invalid stop bits: {}", other),
                }
                .into())
            }
        };

        serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.timeout_ms.max(1)))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    fn spawn_reader(
        &self,
        mut reader: Box<dyn serialport::SerialPort>,
        callback: TransportCallback,
    ) -> Result<()> {
        let running = self.running.clone();
        thread::Builder::new()
            .name(format!("serial-reader {}", self.port_name))
            .spawn(move || {
                let mut assembler = LineAssembler::new();
                let mut buf = [0u8; 1024];
                while running.load(Ordering::SeqCst) {
                    match reader.read(&mut buf) {
                        Ok(0) => {}
                        Ok(n) => {
                            for line in assembler.push(&buf[..n]) {
                                if !running.load(Ordering::SeqCst) {
                                    return;
                                }
                                callback(TransportEvent::Line(line));
                            }
                        }
                        Err(e)
                            if matches!(
                                e.kind(),
                                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                            ) => {}
                        Err(e) => {
                            if running.swap(false, Ordering::SeqCst) {
                                callback(TransportEvent::ConnectionLost(e.to_string()));
                            }
                            return;
                        }
                    }
                }
            })
            .map(|_| ())
            .map_err(|e| ConnectionError::IoError {
                reason: e.to_string(),
            }
            .into())
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self, params: &ConnectionParams, callback: TransportCallback) -> Result<()> {
        if params.driver != ConnectionDriver::Serial {
            return Err(ConnectionError::InvalidParameters {
                reason: format!("SerialTransport cannot use the {} driver", params.driver),
            }
            .into());
        }
        if self.is_connected() {
            return Err(ConnectionError::AlreadyOpen {
                port: self.port_name.clone(),
            }
            .into());
        }

        let port = Self::open(params)?;
        let reader = port.try_clone().map_err(|e| ConnectionError::SerialError {
            reason: e.to_string(),
        })?;

        // A fresh flag so a reader left over from an earlier connection stays stopped.
        self.running = Arc::new(AtomicBool::new(true));
        self.port_name = params.port.clone();
        if let Err(e) = self.spawn_reader(reader, callback) {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.writer = Some(port);
        tracing::info!("Opened serial port {}", params.port);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        // The reader exits on its next read timeout.
        self.running.store(false, Ordering::SeqCst);
        if self.writer.take().is_some() {
            tracing::info!("Closed serial port {}", self.port_name);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some() && self.running.load(Ordering::SeqCst)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.writer.as_mut().ok_or(ConnectionError::NotConnected)?;
        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| {
                ConnectionError::IoError {
                    reason: e.to_string(),
                }
                .into()
            })
    }

    fn name(&self) -> String {
        self.port_name.clone()
    }
}
