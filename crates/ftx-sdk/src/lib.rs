//! FTX SDK - fischertechnik ROBO TX 夹爪机械臂 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 帧头、输入输出传输区的编码/解码
//! - **串口层** (`serial`): 串口抽象、按名称发现、模拟控制器
//! - **驱动层** (`driver`): 握手、20ms 交换循环、状态同步、计数累计
//! - **控制层** (`control`): 自动化流程与字符串命令调度
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use ftx_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! ftx_sdk::init_logger!();
//!
//! let driver = Arc::new(DriverBuilder::new().build().unwrap());
//! let dispatcher = CommandDispatcher::new(driver, AutomationTiming::default());
//! dispatcher.set("AState", "1").unwrap();
//! ```

pub use ftx_control as control;
pub use ftx_driver as driver;
pub use ftx_protocol as protocol;
pub use ftx_serial as serial;

pub mod prelude;

#[doc(hidden)]
pub mod __private {
    pub use tracing_log;
    pub use tracing_subscriber;
}

// --- 用户以此为界 ---

pub use control::{
    AutomationController, AutomationError, AutomationState, AutomationTiming, CommandDispatcher,
    DispatchError, Procedure,
};
pub use driver::{
    ConnectError, DeviceEvent, Driver, DriverBuilder, DriverError, EventHook, LinkState,
    TransportConfig,
};
pub use protocol::{CodecError, InputId, InputSnapshot, MotorId, OutputCommand};
pub use serial::{PortSettings, SerialError};

/// 初始化日志
///
/// 安装 `tracing-subscriber` 的 fmt 输出（`RUST_LOG` 控制过滤，默认 `info`），
/// 并把 `log` 记录桥接到 `tracing`。重复调用无副作用。
///
/// ```rust,no_run
/// ftx_sdk::init_logger!();
/// // 或指定默认过滤
/// ftx_sdk::init_logger!("ftx_driver=debug");
/// ```
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger!("info")
    };
    ($default:expr) => {{
        use $crate::__private::tracing_subscriber::{self, EnvFilter};
        let _ = $crate::__private::tracing_log::LogTracer::init();
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new($default));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }};
}
