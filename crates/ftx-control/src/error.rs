//! 控制层错误类型定义

use crate::channel::Channel;
use ftx_driver::DriverError;
use thiserror::Error;

/// 计数移动堵转
///
/// 只记录日志，不终止流程：当前步骤被放弃，电机保持运行，流程继续下一步。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{channel} stuck at counter {counter} (target {target}, {stalls} stalled polls)")]
pub struct StuckMotion {
    pub channel: Channel,
    pub target: u16,
    pub counter: u16,
    pub stalls: u32,
}

/// 自动化错误
#[derive(Error, Debug)]
pub enum AutomationError {
    /// 取消令牌被触发
    #[error("Automation cancelled")]
    Cancelled,

    /// 计数移动堵转
    #[error(transparent)]
    Stuck(#[from] StuckMotion),

    /// 回零超时
    #[error("{channel} did not reach its limit input within {timeout_ms}ms")]
    HomeTimeout { channel: Channel, timeout_ms: u64 },

    /// 未知流程名
    #[error("Unknown automation procedure: {0}")]
    UnknownProcedure(String),

    /// 无法启动后台线程
    #[error("Failed to spawn automation worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl AutomationError {
    /// 步骤级错误：记录后流程继续
    pub fn is_step_failure(&self) -> bool {
        matches!(self, Self::Stuck(_) | Self::HomeTimeout { .. })
    }
}

/// 调度错误
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unknown interface: {0}")]
    UnknownInterface(String),

    #[error("Invalid value {value:?} for {interface}")]
    InvalidValue { interface: String, value: String },

    #[error("Missing value for set on {0}")]
    MissingValue(String),

    #[error("Interface {0} is read-only")]
    ReadOnly(String),

    /// 未连接且连接失败
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(#[source] DriverError),

    #[error("Automation error: {0}")]
    Automation(#[from] AutomationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failures() {
        let stuck = AutomationError::from(StuckMotion {
            channel: Channel::Gripper,
            target: 10,
            counter: 3,
            stalls: 6,
        });
        assert!(stuck.is_step_failure());
        assert!(
            AutomationError::HomeTimeout {
                channel: Channel::ArmVertical,
                timeout_ms: 30_000,
            }
            .is_step_failure()
        );
        assert!(!AutomationError::Cancelled.is_step_failure());
    }

    #[test]
    fn test_display() {
        let e = StuckMotion {
            channel: Channel::Gripper,
            target: 10,
            counter: 3,
            stalls: 6,
        };
        assert_eq!(
            e.to_string(),
            "Gripper(M4) stuck at counter 3 (target 10, 6 stalled polls)"
        );
        let e = DispatchError::InvalidValue {
            interface: "M1".to_string(),
            value: "fast".to_string(),
        };
        assert_eq!(e.to_string(), "Invalid value \"fast\" for M1");
    }
}
