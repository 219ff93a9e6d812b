//! # FTX Serial Adapter Layer
//!
//! 串口硬件抽象层，提供统一的串口接口抽象。
//!
//! - [`SerialAdapter`]: 已打开的串口（只由传输循环线程访问）
//! - [`Connector`]: 发现并打开串口的工厂，断线后由驱动重新调用
//! - `native` feature: 基于 `serialport` crate 的本机后端
//! - `mock` feature: 模拟控制器，用于无硬件测试

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "native")]
pub mod port;

#[cfg(feature = "native")]
pub use port::{PortInfo, SerialPortAdapter, SerialPortConnector, list_ports};

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockConnector, MockController, MockPort};

/// 默认的串口描述匹配子串
pub const DEFAULT_NAME_PATTERNS: [&str; 2] = ["fischertechnik", "ROBO TX Controller"];

/// 串口适配层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Port error: {0}")]
    Port(String),
    #[error("Read timeout")]
    Timeout,
    #[error("No serial port matching {patterns:?}")]
    NotFound { patterns: Vec<String> },
    #[error("Port disconnected")]
    Disconnected,
}

impl SerialError {
    /// 是否为只影响当次读写的瞬时错误
    pub fn is_transient(&self) -> bool {
        match self {
            SerialError::Timeout => true,
            SerialError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// 串口参数
///
/// 固定 8-N-1、无流控；这里只暴露控制器需要的部分。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PortSettings {
    /// 波特率
    pub baud_rate: u32,
    /// 单次读取超时（毫秒）
    pub read_timeout_ms: u64,
    /// 串口描述需包含的子串（任一匹配即可，按顺序尝试）
    pub name_patterns: Vec<String>,
    /// 直接指定串口路径，跳过发现
    pub port_name: Option<String>,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout_ms: 1000,
            name_patterns: DEFAULT_NAME_PATTERNS.iter().map(|s| s.to_string()).collect(),
            port_name: None,
        }
    }
}

impl PortSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// 描述是否匹配任一子串
    pub fn matches(&self, description: &str) -> bool {
        self.name_patterns
            .iter()
            .any(|pattern| description.contains(pattern.as_str()))
    }
}

/// 已打开的串口
///
/// 读写都是阻塞的；`read` 在读超时内没有数据时返回 `SerialError::Timeout`。
pub trait SerialAdapter {
    /// 写出整帧
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), SerialError>;

    /// 读取可用字节到 `buf`，返回读取的字节数
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;

    /// 串口名称（用于日志）
    fn port_name(&self) -> &str;

    /// 丢弃接收缓冲区中残留的字节
    fn discard_input(&mut self) -> Result<(), SerialError> {
        Ok(())
    }
}

impl<T: SerialAdapter + ?Sized> SerialAdapter for Box<T> {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), SerialError> {
        (**self).write_frame(frame)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        (**self).read(buf)
    }

    fn port_name(&self) -> &str {
        (**self).port_name()
    }

    fn discard_input(&mut self) -> Result<(), SerialError> {
        (**self).discard_input()
    }
}

/// 串口工厂
///
/// 驱动在首次连接与每次链路故障后调用 `connect`。
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn SerialAdapter + Send>, SerialError>;

    /// 连接目标描述（用于日志）
    fn describe(&self) -> String;
}
