//! 传输循环性能指标
//!
//! 所有计数器都使用原子操作，可以在任何线程读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 传输循环实时指标
///
/// # 使用示例
///
/// ```rust
/// use ftx_driver::DriverMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = DriverMetrics::default();
/// metrics.cycles_total.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.cycles_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 成功完成的交换周期数
    pub cycles_total: AtomicU64,

    /// 失败的周期数（编解码错误或读取耗尽）
    pub cycles_failed: AtomicU64,

    /// 编解码错误次数
    pub codec_errors: AtomicU64,

    /// 额外的读取尝试次数（第一次读取不计）
    pub read_retries: AtomicU64,

    /// 传输故障次数（连续失败超过上限）
    pub transport_faults: AtomicU64,

    /// 握手次数（含复位后的重新握手）
    pub handshakes: AtomicU64,

    /// 检测到的设备复位次数
    pub device_resets: AtomicU64,

    /// 安全联锁清零占空比的次数
    pub interlock_clamps: AtomicU64,

    /// 周期超时次数（本周期工作耗时超过周期）
    ///
    /// 如果这个值快速增长，说明串口响应慢于 20ms 节拍。
    pub overruns: AtomicU64,

    /// 已发出的设备事件数
    pub events_emitted: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            codec_errors: self.codec_errors.load(Ordering::Relaxed),
            read_retries: self.read_retries.load(Ordering::Relaxed),
            transport_faults: self.transport_faults.load(Ordering::Relaxed),
            handshakes: self.handshakes.load(Ordering::Relaxed),
            device_resets: self.device_resets.load(Ordering::Relaxed),
            interlock_clamps: self.interlock_clamps.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.cycles_total.store(0, Ordering::Relaxed);
        self.cycles_failed.store(0, Ordering::Relaxed);
        self.codec_errors.store(0, Ordering::Relaxed);
        self.read_retries.store(0, Ordering::Relaxed);
        self.transport_faults.store(0, Ordering::Relaxed);
        self.handshakes.store(0, Ordering::Relaxed);
        self.device_resets.store(0, Ordering::Relaxed);
        self.interlock_clamps.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.events_emitted.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变，用于读取）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub cycles_total: u64,
    pub cycles_failed: u64,
    pub codec_errors: u64,
    pub read_retries: u64,
    pub transport_faults: u64,
    pub handshakes: u64,
    pub device_resets: u64,
    pub interlock_clamps: u64,
    pub overruns: u64,
    pub events_emitted: u64,
}

impl MetricsSnapshot {
    /// 周期失败率（百分比）
    ///
    /// 返回 0.0 到 100.0 之间的值。没有任何周期时返回 0.0。
    pub fn failure_rate(&self) -> f64 {
        let attempted = self.cycles_total + self.cycles_failed;
        if attempted == 0 {
            return 0.0;
        }
        (self.cycles_failed as f64 / attempted as f64) * 100.0
    }
}
