//! 设备注册表边界
//!
//! 驱动只在两种情况下调用注册表：连接/断开时标记设备启用状态，
//! 以及构造出站事件时查询设备名称。设备元数据的持久化由注册表负责。

use std::sync::atomic::{AtomicBool, Ordering};

/// 设备注册表
pub trait DeviceRegistry: Send + Sync {
    /// 连接建立（`true`）或断开（`false`）时调用
    fn set_enabled(&self, enabled: bool);

    /// 当前关联的设备名称
    fn device_name(&self) -> String;
}

/// 固定名称的内存注册表（默认实现）
#[derive(Debug)]
pub struct StaticRegistry {
    name: String,
    enabled: AtomicBool,
}

impl StaticRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl Default for StaticRegistry {
    fn default() -> Self {
        Self::new("ROBO TX Controller")
    }
}

impl DeviceRegistry for StaticRegistry {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn device_name(&self) -> String {
        self.name.clone()
    }
}
