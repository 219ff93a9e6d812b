//! 驱动层模块
//!
//! 本模块提供 ROBO TX 控制器的设备驱动功能，包括：
//! - 串口发现、握手与会话令牌管理
//! - 周期性交换循环（20ms 节拍，读重试，故障计数）
//! - 状态同步（ArcSwap 无锁读取输入快照）
//! - 编码器计数累计（溢出处理 + 事件去抖）
//! - 钩子系统：设备事件与链路状态回调
//!
//! # 使用场景
//!
//! 适用于直接读写输入输出的场景。
//! 自动化流程与字符串命令接口见 `ftx-control`。

mod builder;
pub mod counter;
mod driver;
mod error;
pub mod hooks;
pub mod link;
pub mod liveness;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod state;

pub use builder::DriverBuilder;
pub use counter::{CounterEvent, CounterTracker};
pub use driver::Driver;
pub use error::{ConnectError, DriverError};
pub use hooks::{ChannelEventHook, DeviceEvent, EventHook, HookManager, LinkHook};
pub use link::{AtomicLinkState, LinkState};
pub use liveness::LivenessMonitor;
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use pipeline::{CycleOutcome, TransportConfig, handshake, io_loop, run_cycle};
pub use registry::{DeviceRegistry, StaticRegistry};
pub use state::DriverContext;
