//! 钩子系统
//!
//! 传输循环在以下时机触发回调：
//! - 数字输入变化、累计计数器事件、自动化状态变化：[`EventHook::on_event`]
//! - 链路状态变化：[`LinkHook::on_link_state`]
//!
//! 回调在传输循环线程中同步执行，必须非阻塞；
//! 需要做 I/O 的消费者应使用 [`ChannelEventHook`] 把事件转到自己的线程。
//!
//! # 使用示例
//!
//! ```rust
//! use ftx_driver::hooks::{ChannelEventHook, DeviceEvent, EventHook, HookManager};
//! use std::sync::Arc;
//!
//! let mut hooks = HookManager::new();
//! let (hook, rx) = ChannelEventHook::new(64);
//! hooks.add_event_hook(Arc::new(hook));
//!
//! hooks.emit(&DeviceEvent::new("rig", "I3", "1"));
//! assert_eq!(rx.try_recv().unwrap().interface, "I3");
//! ```

use crate::link::LinkState;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 出站设备事件
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceEvent {
    /// 设备名称（来自注册表）
    pub device: String,
    /// 接口名（`I3`、`CC1`、`AState`）
    pub interface: String,
    /// 新值
    pub value: String,
}

impl DeviceEvent {
    pub fn new(
        device: impl Into<String>,
        interface: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            interface: interface.into(),
            value: value.into(),
        }
    }
}

/// 设备事件回调
///
/// # 性能要求
///
/// - **非阻塞**: 在传输循环线程中调用，阻塞会拖慢 20ms 节拍
/// - 推荐使用 `try_send` 而非 `send`
pub trait EventHook: Send + Sync {
    fn on_event(&self, event: &DeviceEvent);
}

/// 链路状态回调
pub trait LinkHook: Send + Sync {
    /// 链路状态从 `previous` 变为 `current` 时调用
    fn on_link_state(&self, previous: LinkState, current: LinkState);
}

/// 钩子管理器
///
/// 回调列表本身不是线程安全的，由 `DriverContext` 用读写锁保护。
#[derive(Default)]
pub struct HookManager {
    event_hooks: Vec<Arc<dyn EventHook>>,
    link_hooks: Vec<Arc<dyn LinkHook>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            event_hooks: Vec::new(),
            link_hooks: Vec::new(),
        }
    }

    pub fn add_event_hook(&mut self, hook: Arc<dyn EventHook>) {
        self.event_hooks.push(hook);
    }

    pub fn add_link_hook(&mut self, hook: Arc<dyn LinkHook>) {
        self.link_hooks.push(hook);
    }

    /// 移除所有回调
    pub fn clear(&mut self) {
        self.event_hooks.clear();
        self.link_hooks.clear();
    }

    /// 触发所有事件回调
    pub fn emit(&self, event: &DeviceEvent) {
        for hook in self.event_hooks.iter() {
            hook.on_event(event);
        }
    }

    /// 触发所有链路回调
    pub fn notify_link(&self, previous: LinkState, current: LinkState) {
        for hook in self.link_hooks.iter() {
            hook.on_link_state(previous, current);
        }
    }

    pub fn len(&self) -> usize {
        self.event_hooks.len() + self.link_hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 把事件转发到有界 channel 的回调
///
/// channel 满时丢弃事件并计数，从不阻塞传输循环。
pub struct ChannelEventHook {
    tx: Sender<DeviceEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelEventHook {
    /// 创建钩子与接收端
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<DeviceEvent>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// 丢弃计数器（可在钩子注册后继续读取）
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}

impl EventHook for ChannelEventHook {
    fn on_event(&self, event: &DeviceEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}
