//! 命令调度器
//!
//! 把外部的 `(接口名, get/set, 值)` 请求翻译为寄存器读写或自动化状态变更。
//!
//! | 接口 | get | set |
//! |---|---|---|
//! | `AState` | 流程是否运行（`1`/`0`） | `0` 停止、`1` 启动、`2` 回零 |
//! | `AName` | 当前流程名 | 选择流程（未知名称返回当前名称） |
//! | `S1` | 安全联锁（`1`/`0`） | `0`/`1` |
//! | `M1`-`M4` | 占空比 | 占空比 `[-512, 512]` |
//! | `I1`-`I8` | `1`/`0` | 只读 |
//! | `CC1`-`CC4` | 累计计数 | 只读 |

use crate::automation::{AutomationController, AutomationState, AutomationTiming, MotionIo};
use crate::error::DispatchError;
use ftx_driver::Driver;
use ftx_protocol::{DUTY_MAX, InputId, MotorId};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// 可寻址接口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    AutomationState,
    AutomationName,
    Safety,
    Motor(MotorId),
    Input(InputId),
    Counter(MotorId),
}

/// 解析接口编号：只接受纯数字
fn parse_index(digits: &str) -> Option<u8> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl FromStr for Interface {
    type Err = DispatchError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unknown = || DispatchError::UnknownInterface(name.to_string());
        match name {
            "AState" => return Ok(Self::AutomationState),
            "AName" => return Ok(Self::AutomationName),
            "S1" => return Ok(Self::Safety),
            _ => {},
        }

        if let Some(rest) = name.strip_prefix("CC") {
            return parse_index(rest)
                .and_then(MotorId::new)
                .map(Self::Counter)
                .ok_or_else(unknown);
        }
        if let Some(rest) = name.strip_prefix('M') {
            return parse_index(rest)
                .and_then(MotorId::new)
                .map(Self::Motor)
                .ok_or_else(unknown);
        }
        if let Some(rest) = name.strip_prefix('I') {
            return parse_index(rest)
                .and_then(InputId::new)
                .map(Self::Input)
                .ok_or_else(unknown);
        }
        Err(unknown())
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interface::AutomationState => write!(f, "AState"),
            Interface::AutomationName => write!(f, "AName"),
            Interface::Safety => write!(f, "S1"),
            Interface::Motor(motor) => write!(f, "{}", motor),
            Interface::Input(input) => write!(f, "{}", input),
            Interface::Counter(motor) => write!(f, "CC{}", motor.number()),
        }
    }
}

/// 操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Set,
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "set" => Ok(Self::Set),
            other => Err(format!("unknown operation: {}", other)),
        }
    }
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// 命令调度器
pub struct CommandDispatcher {
    driver: Arc<Driver>,
    automation: Arc<AutomationController>,
}

impl CommandDispatcher {
    /// 创建调度器及其自动化控制器，并在驱动上注册链路回调
    pub fn new(driver: Arc<Driver>, timing: AutomationTiming) -> Self {
        let io: Arc<dyn MotionIo> = driver.context().clone();
        let automation = Arc::new(AutomationController::new(io, timing));
        Self::with_controller(driver, automation)
    }

    /// 使用已有的自动化控制器
    pub fn with_controller(driver: Arc<Driver>, automation: Arc<AutomationController>) -> Self {
        driver.add_link_hook(automation.link_hook());
        Self { driver, automation }
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    pub fn automation(&self) -> &Arc<AutomationController> {
        &self.automation
    }

    /// 处理一个请求
    ///
    /// 未连接时先连接，连接失败返回 `DeviceUnavailable`。
    pub fn dispatch(
        &self,
        name: &str,
        operation: Operation,
        value: Option<&str>,
    ) -> Result<String, DispatchError> {
        let interface: Interface = name.parse()?;
        self.driver
            .ensure_connected()
            .map_err(DispatchError::DeviceUnavailable)?;

        let result = match operation {
            Operation::Get => self.get_interface(interface),
            Operation::Set => {
                let value = value.ok_or_else(|| DispatchError::MissingValue(name.to_string()))?;
                self.set_interface(interface, value)
            },
        }?;
        debug!("{:?} {} -> {}", operation, interface, result);
        Ok(result)
    }

    pub fn get(&self, name: &str) -> Result<String, DispatchError> {
        self.dispatch(name, Operation::Get, None)
    }

    pub fn set(&self, name: &str, value: &str) -> Result<String, DispatchError> {
        self.dispatch(name, Operation::Set, Some(value))
    }

    fn get_interface(&self, interface: Interface) -> Result<String, DispatchError> {
        let ctx = self.driver.context();
        Ok(match interface {
            Interface::AutomationState => flag(self.automation.is_running()),
            Interface::AutomationName => self.automation.procedure().to_string(),
            Interface::Safety => flag(ctx.safety_interlock()),
            Interface::Motor(motor) => ctx.duty(motor).to_string(),
            Interface::Input(input) => flag(ctx.is_pressed(input)),
            Interface::Counter(motor) => ctx.cumulative(motor).to_string(),
        })
    }

    fn set_interface(&self, interface: Interface, value: &str) -> Result<String, DispatchError> {
        let invalid = || DispatchError::InvalidValue {
            interface: interface.to_string(),
            value: value.to_string(),
        };
        let ctx = self.driver.context();

        match interface {
            Interface::AutomationState => {
                let state = value
                    .trim()
                    .parse::<u8>()
                    .ok()
                    .and_then(AutomationState::from_code)
                    .ok_or_else(invalid)?;
                if !self.automation.request_state(state) {
                    return Ok(flag(self.automation.is_running()));
                }
                self.automation.apply_requested_state()?;
                let running = self.automation.is_running();
                info!("Automation state set to {} (running: {})", state, running);
                ctx.emit("AState", if running { "Running" } else { "NotRunning" });
                Ok(state.code().to_string())
            },
            Interface::AutomationName => {
                if self.automation.set_procedure_name(value.trim()) {
                    Ok(value.trim().to_string())
                } else {
                    Ok(self.automation.procedure().to_string())
                }
            },
            Interface::Safety => {
                let enabled = match value.trim() {
                    "1" => true,
                    "0" => false,
                    _ => return Err(invalid()),
                };
                ctx.set_safety_interlock(enabled);
                Ok(flag(enabled))
            },
            Interface::Motor(motor) => {
                let power = value
                    .trim()
                    .parse::<i16>()
                    .ok()
                    .filter(|p| (-DUTY_MAX..=DUTY_MAX).contains(p))
                    .ok_or_else(invalid)?;
                ctx.set_duty(motor, power);
                Ok(power.to_string())
            },
            Interface::Input(_) | Interface::Counter(_) => {
                Err(DispatchError::ReadOnly(interface.to_string()))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_grammar() {
        assert_eq!("AState".parse::<Interface>().unwrap(), Interface::AutomationState);
        assert_eq!("AName".parse::<Interface>().unwrap(), Interface::AutomationName);
        assert_eq!("S1".parse::<Interface>().unwrap(), Interface::Safety);
        assert_eq!("M4".parse::<Interface>().unwrap(), Interface::Motor(MotorId::M4));
        assert_eq!(
            "I8".parse::<Interface>().unwrap(),
            Interface::Input(InputId::new(8).unwrap())
        );
        assert_eq!("CC2".parse::<Interface>().unwrap(), Interface::Counter(MotorId::M2));
    }

    #[test]
    fn test_interface_rejects_out_of_range_and_garbage() {
        for name in [
            "M0", "M5", "I0", "I9", "CC0", "CC5", "M", "I", "CC", "M+1", "M1x", "S2", "astate",
            "C1", "X1", "", "I256",
        ] {
            assert!(
                matches!(
                    name.parse::<Interface>(),
                    Err(DispatchError::UnknownInterface(ref n)) if n == name
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_interface_display_round_trips() {
        for name in ["AState", "AName", "S1", "M2", "I7", "CC3"] {
            assert_eq!(name.parse::<Interface>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!("get".parse::<Operation>().unwrap(), Operation::Get);
        assert_eq!("SET".parse::<Operation>().unwrap(), Operation::Set);
        assert!("put".parse::<Operation>().is_err());
    }
}
