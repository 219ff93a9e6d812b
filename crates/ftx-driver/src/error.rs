//! 驱动层错误类型定义

use ftx_protocol::CodecError;
use ftx_serial::SerialError;
use thiserror::Error;

/// 连接错误
///
/// 返回给发起连接的调用方；下一次请求会重新尝试连接。
#[derive(Error, Debug)]
pub enum ConnectError {
    /// 没有描述匹配的串口
    #[error("No matching serial port: {0}")]
    NotFound(String),

    /// 串口打开失败
    #[error("Failed to open serial port: {0}")]
    PortError(#[source] SerialError),
}

impl From<SerialError> for ConnectError {
    fn from(e: SerialError) -> Self {
        match e {
            SerialError::NotFound { patterns } => ConnectError::NotFound(patterns.join(", ")),
            other => ConnectError::PortError(other),
        }
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 连接错误
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// 编解码错误（本周期交换失败）
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// 串口读写错误
    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    /// 连续失败周期超过上限
    #[error("Transport fault after {failures} consecutive failed cycles")]
    TransportFault { failures: u32 },

    /// 控制器复位后重新握手失败
    #[error("Device reset detected and re-handshake failed")]
    DeviceReset,

    /// 链路已断开
    #[error("Link is down")]
    LinkDown,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::TransportFault { failures: 3 };
        assert_eq!(
            format!("{}", err),
            "Transport fault after 3 consecutive failed cycles"
        );

        let err = DriverError::Codec(CodecError::ShortFrame {
            expected: 63,
            actual: 5,
        });
        assert!(format!("{}", err).contains("Short frame"));

        assert_eq!(format!("{}", DriverError::LinkDown), "Link is down");
    }

    #[test]
    fn test_connect_error_from_serial() {
        let err: ConnectError = SerialError::NotFound {
            patterns: vec!["fischertechnik".into(), "ROBO TX Controller".into()],
        }
        .into();
        match err {
            ConnectError::NotFound(msg) => assert!(msg.contains("ROBO TX Controller")),
            _ => panic!("Expected NotFound variant"),
        }

        let err: ConnectError = SerialError::Port("access denied".into()).into();
        assert!(matches!(err, ConnectError::PortError(SerialError::Port(_))));
    }

    #[test]
    fn test_from_serial_error() {
        let err: DriverError = SerialError::Timeout.into();
        assert!(matches!(err, DriverError::Serial(SerialError::Timeout)));
    }
}
