//! 本机串口后端（serialport crate）
//!
//! 通过串口描述中的子串发现控制器，按 8-N-1、无流控打开。

use crate::{Connector, PortSettings, SerialAdapter, SerialError};
use serialport::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits,
};
use std::io::{Read, Write};
use tracing::{debug, trace};

/// 已发现串口的描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// 系统路径（`/dev/ttyACM0`、`COM3`）
    pub port_name: String,
    /// 可读描述（厂商 + 产品 + 路径），用于名称匹配
    pub description: String,
}

fn usb_description(
    port_name: &str,
    vid: u16,
    pid: u16,
    manufacturer: Option<&str>,
    product: Option<&str>,
) -> String {
    let parts: Vec<&str> = manufacturer.into_iter().chain(product).collect();
    if parts.is_empty() {
        format!("USB {:04x}:{:04x} ({})", vid, pid, port_name)
    } else {
        format!("{} ({})", parts.join(" "), port_name)
    }
}

fn describe(info: &serialport::SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => usb_description(
            &info.port_name,
            usb.vid,
            usb.pid,
            usb.manufacturer.as_deref(),
            usb.product.as_deref(),
        ),
        SerialPortType::BluetoothPort => format!("Bluetooth ({})", info.port_name),
        SerialPortType::PciPort => format!("PCI ({})", info.port_name),
        SerialPortType::Unknown => info.port_name.clone(),
    }
}

fn port_error(e: serialport::Error) -> SerialError {
    match e.kind() {
        serialport::ErrorKind::Io(kind) => {
            SerialError::Io(std::io::Error::new(kind, e.description))
        },
        serialport::ErrorKind::NoDevice => SerialError::Disconnected,
        _ => SerialError::Port(e.to_string()),
    }
}

/// 列出本机串口
pub fn list_ports() -> Result<Vec<PortInfo>, SerialError> {
    let ports = serialport::available_ports().map_err(port_error)?;
    Ok(ports
        .iter()
        .map(|info| PortInfo {
            port_name: info.port_name.clone(),
            description: describe(info),
        })
        .collect())
}

/// 选择第一个描述匹配的串口
pub fn find_port(settings: &PortSettings) -> Result<PortInfo, SerialError> {
    let ports = list_ports()?;
    debug!("Found {} serial port(s)", ports.len());
    ports
        .into_iter()
        .find(|port| settings.matches(&port.description) || settings.matches(&port.port_name))
        .ok_or_else(|| SerialError::NotFound {
            patterns: settings.name_patterns.clone(),
        })
}

/// serialport 后端适配器
pub struct SerialPortAdapter {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialPortAdapter {
    /// 按给定参数打开串口
    pub fn open(port_name: &str, settings: &PortSettings) -> Result<Self, SerialError> {
        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout())
            .open()
            .map_err(port_error)?;

        debug!(
            "Opened {} at {} baud (timeout {}ms)",
            port_name, settings.baud_rate, settings.read_timeout_ms
        );
        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl SerialAdapter for SerialPortAdapter {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), SerialError> {
        trace!(port = %self.name, frame = %hex::encode(frame), "TX");
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        match self.port.read(buf) {
            Ok(0) => Err(SerialError::Timeout),
            Ok(n) => {
                trace!(port = %self.name, bytes = %hex::encode(&buf[..n]), "RX");
                Ok(n)
            },
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(SerialError::Timeout),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Err(SerialError::Disconnected),
            Err(e) => Err(SerialError::Io(e)),
        }
    }

    fn port_name(&self) -> &str {
        &self.name
    }

    fn discard_input(&mut self) -> Result<(), SerialError> {
        self.port.clear(ClearBuffer::Input).map_err(port_error)
    }
}

/// 基于名称发现的本机串口工厂
#[derive(Debug, Clone, Default)]
pub struct SerialPortConnector {
    settings: PortSettings,
}

impl SerialPortConnector {
    pub fn new(settings: PortSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }
}

impl Connector for SerialPortConnector {
    fn connect(&self) -> Result<Box<dyn SerialAdapter + Send>, SerialError> {
        let port_name = match &self.settings.port_name {
            Some(name) => name.clone(),
            None => find_port(&self.settings)?.port_name,
        };
        let adapter = SerialPortAdapter::open(&port_name, &self.settings)?;
        Ok(Box::new(adapter))
    }

    fn describe(&self) -> String {
        match &self.settings.port_name {
            Some(name) => name.clone(),
            None => format!("first port matching {:?}", self.settings.name_patterns),
        }
    }
}
