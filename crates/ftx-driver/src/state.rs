//! 共享状态上下文
//!
//! - 输入快照：`ArcSwap` 整体发布，读者无锁
//! - 输出命令：`parking_lot::Mutex`，调度器、自动化与传输循环共用同一把锁
//! - 累计计数器：`parking_lot::Mutex`，只在传输循环线程写入
//! - 链路状态、安全联锁开关：原子变量

use crate::counter::CounterTracker;
use crate::hooks::{DeviceEvent, EventHook, HookManager, LinkHook};
use crate::liveness::LivenessMonitor;
use crate::link::{AtomicLinkState, LinkState};
use crate::metrics::DriverMetrics;
use crate::registry::DeviceRegistry;
use arc_swap::ArcSwap;
use ftx_protocol::{InputId, InputSnapshot, MotorId, OutputCommand};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// 驱动共享上下文
pub struct DriverContext {
    /// 最近发布的输入快照
    snapshot: ArcSwap<InputSnapshot>,
    /// 下一帧要写出的输出命令
    output: Mutex<OutputCommand>,
    /// 累计计数器
    counters: Mutex<CounterTracker>,
    /// 安全联锁开关
    safety: AtomicBool,
    link: AtomicLinkState,
    pub metrics: DriverMetrics,
    pub liveness: LivenessMonitor,
    hooks: RwLock<HookManager>,
    registry: Arc<dyn DeviceRegistry>,
}

impl DriverContext {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        debounce: Duration,
        liveness_timeout: Duration,
        safety_interlock: bool,
    ) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(InputSnapshot::default()),
            output: Mutex::new(OutputCommand::new()),
            counters: Mutex::new(CounterTracker::with_debounce(debounce)),
            safety: AtomicBool::new(safety_interlock),
            link: AtomicLinkState::default(),
            metrics: DriverMetrics::new(),
            liveness: LivenessMonitor::new(liveness_timeout),
            hooks: RwLock::new(HookManager::new()),
            registry,
        }
    }

    // ==================== 输入 ====================

    /// 最近发布的输入快照
    pub fn snapshot(&self) -> Arc<InputSnapshot> {
        self.snapshot.load_full()
    }

    pub fn is_pressed(&self, input: InputId) -> bool {
        self.snapshot.load().is_pressed(input)
    }

    /// 原始 16 位计数器
    pub fn raw_counter(&self, motor: MotorId) -> u16 {
        self.snapshot.load().counter(motor)
    }

    /// 进程生命周期内的累计计数
    pub fn cumulative(&self, motor: MotorId) -> u64 {
        self.counters.lock().cumulative(motor)
    }

    // ==================== 输出 ====================

    /// 在输出锁内修改输出命令
    pub fn with_output<R>(&self, f: impl FnOnce(&mut OutputCommand) -> R) -> R {
        let mut guard = self.output.lock();
        f(&mut *guard)
    }

    /// 当前输出命令的副本
    pub fn output(&self) -> OutputCommand {
        self.output.lock().clone()
    }

    pub fn set_duty(&self, motor: MotorId, power: i16) {
        self.with_output(|cmd| cmd.set_duty(motor, power));
    }

    pub fn duty(&self, motor: MotorId) -> i16 {
        self.output.lock().duty(motor)
    }

    pub fn set_distance(&self, motor: MotorId, distance: u16) {
        self.with_output(|cmd| cmd.set_distance(motor, distance));
    }

    pub fn reset_counter(&self, motor: MotorId) {
        self.with_output(|cmd| cmd.reset_counter(motor));
    }

    /// 在同一次加锁内停止多个电机
    pub fn stop_motors(&self, motors: &[MotorId]) {
        self.with_output(|cmd| {
            for &motor in motors {
                cmd.stop(motor);
            }
        });
    }

    // ==================== 安全联锁 ====================

    pub fn safety_interlock(&self) -> bool {
        self.safety.load(Ordering::Acquire)
    }

    pub fn set_safety_interlock(&self, enabled: bool) {
        self.safety.store(enabled, Ordering::Release);
    }

    // ==================== 链路状态 ====================

    pub fn link_state(&self) -> LinkState {
        self.link.get()
    }

    /// 切换链路状态
    ///
    /// 状态真正变化时通知链路回调；进入/离开 `Streaming` 时同步注册表启用状态。
    /// 调用方不得持有输出锁。
    pub fn set_link_state(&self, state: LinkState) {
        let previous = self.link.swap(state);
        if previous == state {
            return;
        }
        debug!("Link state: {} -> {}", previous, state);

        match state {
            LinkState::Streaming => self.registry.set_enabled(true),
            LinkState::Disconnected => self.registry.set_enabled(false),
            LinkState::Handshaking => {},
        }
        self.hooks.read().notify_link(previous, state);
    }

    // ==================== 事件 ====================

    pub fn add_event_hook(&self, hook: Arc<dyn EventHook>) {
        self.hooks.write().add_event_hook(hook);
    }

    pub fn add_link_hook(&self, hook: Arc<dyn LinkHook>) {
        self.hooks.write().add_link_hook(hook);
    }

    pub fn device_name(&self) -> String {
        self.registry.device_name()
    }

    /// 发出设备事件
    pub fn emit(&self, interface: impl Into<String>, value: impl Into<String>) {
        let event = DeviceEvent::new(self.registry.device_name(), interface, value);
        self.metrics.events_emitted.fetch_add(1, Ordering::Relaxed);
        self.hooks.read().emit(&event);
    }

    // ==================== 发布（传输循环专用） ====================

    /// 发布新快照
    ///
    /// 依次：与上一快照比较数字输入、更新累计计数器、原子替换快照、
    /// 应用安全联锁；所有锁释放后再发事件。
    pub(crate) fn publish(&self, snapshot: InputSnapshot, now: Instant) {
        let previous = self.snapshot.load_full();
        let changed: Vec<(InputId, bool)> = InputId::all()
            .filter(|&input| {
                previous.digital_in[input.index()] != snapshot.digital_in[input.index()]
            })
            .map(|input| (input, snapshot.is_pressed(input)))
            .collect();
        let counter_events = self.counters.lock().observe(snapshot.counter, now);

        let snapshot = Arc::new(snapshot);
        self.snapshot.store(Arc::clone(&snapshot));

        if self.safety_interlock() {
            let clamps = self.with_output(|cmd| crate::pipeline::apply_interlock(&snapshot, cmd));
            if clamps > 0 {
                self.metrics
                    .interlock_clamps
                    .fetch_add(u64::from(clamps), Ordering::Relaxed);
            }
        }

        for (input, pressed) in changed {
            self.emit(input.to_string(), if pressed { "1" } else { "0" });
        }
        for event in counter_events {
            self.emit(format!("CC{}", event.motor.number()), event.value.to_string());
        }
    }

    /// 握手后调用：下一个快照作为计数器基线
    pub(crate) fn rebase_counters(&self) {
        self.counters.lock().rebase();
    }
}
