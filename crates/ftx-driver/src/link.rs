//! 链路状态定义
//!
//! `Disconnected → Handshaking → Streaming → (故障) Disconnected`
//!
//! 只有传输循环与 `Driver::connect` 写入链路状态，其他线程只读。

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 链路状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum LinkState {
    /// 未连接（默认）
    #[default]
    Disconnected = 0,

    /// 已打开串口，正在发送配置帧
    Handshaking = 1,

    /// 周期交换中
    Streaming = 2,
}

impl LinkState {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Disconnected。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Handshaking,
            2 => Self::Streaming,
            _ => Self::Disconnected,
        }
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_streaming(self) -> bool {
        self == Self::Streaming
    }

    pub fn is_disconnected(self) -> bool {
        self == Self::Disconnected
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Handshaking => "Handshaking",
            Self::Streaming => "Streaming",
        };
        f.write_str(name)
    }
}

/// 链路状态（原子版本，用于线程间共享）
#[derive(Debug, Default)]
pub struct AtomicLinkState {
    inner: AtomicU8,
}

impl AtomicLinkState {
    pub fn new(state: LinkState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    /// 获取当前状态
    pub fn get(&self) -> LinkState {
        LinkState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// 设置状态，返回旧状态
    pub fn swap(&self, state: LinkState) -> LinkState {
        LinkState::from_u8(self.inner.swap(state.as_u8(), Ordering::AcqRel))
    }
}
