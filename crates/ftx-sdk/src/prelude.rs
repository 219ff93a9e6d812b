//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use ftx_sdk::prelude::*;
//! ```

// 控制层（推荐入口）
pub use crate::control::{
    AutomationController, AutomationState, AutomationTiming, Channel, CommandDispatcher,
    Direction, Procedure,
};

// 驱动层
pub use crate::driver::{
    ChannelEventHook, DeviceEvent, Driver, DriverBuilder, EventHook, LinkHook, LinkState,
    TransportConfig,
};

// 协议层
pub use crate::protocol::{InputId, InputSnapshot, MotorId};

// 串口层
pub use crate::serial::PortSettings;

// 错误类型
pub use crate::control::{AutomationError, DispatchError};
pub use crate::driver::{ConnectError, DriverError};
pub use crate::protocol::CodecError;
pub use crate::serial::SerialError;
