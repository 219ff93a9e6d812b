//! # FTX Control
//!
//! 夹爪机械臂的控制层：
//! - [`automation`]: 自动化状态机、运动原语（回零、计数移动）与命名流程
//! - [`dispatch`]: 字符串接口的命令调度器（`AState`、`AName`、`S1`、`M<n>`、`I<n>`、`CC<n>`）
//!
//! 两者都建立在 `ftx-driver` 的共享上下文之上，不直接接触串口。

pub mod automation;
pub mod channel;
pub mod dispatch;
mod error;

pub use automation::{
    AutomationController, AutomationState, AutomationTiming, CancelToken, MotionIo, Procedure,
};
pub use channel::{Channel, Direction};
pub use dispatch::{CommandDispatcher, Interface, Operation};
pub use error::{AutomationError, DispatchError, StuckMotion};
