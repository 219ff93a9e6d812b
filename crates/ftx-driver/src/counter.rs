//! 累计计数器
//!
//! 硬件计数器是 16 位的，会回绕，也会被计数器复位请求清零。
//! `CounterTracker` 把每周期的原始值还原为进程生命周期内单调递增的累计值，
//! 并对计数事件做去抖。
//!
//! # 回绕与复位的区分
//!
//! | delta = current - previous | 解释 | 累加 |
//! |---|---|---|
//! | `> 0` | 正常计数 | `delta` |
//! | `(-10000, 0)` | 计数器被复位后又走了 `current` | `current` |
//! | `<= -10000` | 16 位回绕 | `delta + 65536` |
//!
//! 累计值跨重连保留；每次握手后的第一个快照只作为基线，不产生增量。

use ftx_protocol::{MOTOR_COUNT, MotorId};
use std::time::{Duration, Instant};
use tracing::warn;

/// 小于等于该值的负 delta 视为回绕
pub const ROLLOVER_THRESHOLD: i32 = -10_000;

/// 默认事件去抖窗口
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// 计数事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEvent {
    pub motor: MotorId,
    /// 累计值
    pub value: u64,
}

/// 累计计数器状态
#[derive(Debug, Clone)]
pub struct CounterTracker {
    cumulative: [u64; MOTOR_COUNT],
    last_event_value: [u64; MOTOR_COUNT],
    last_event_time: [Option<Instant>; MOTOR_COUNT],
    /// 上一周期原始值；`None` 表示下一个快照是基线
    previous: Option<[u16; MOTOR_COUNT]>,
    debounce: Duration,
}

impl Default for CounterTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterTracker {
    pub fn new() -> Self {
        Self::with_debounce(DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            cumulative: [0; MOTOR_COUNT],
            last_event_value: [0; MOTOR_COUNT],
            last_event_time: [None; MOTOR_COUNT],
            previous: None,
            debounce,
        }
    }

    /// 处理单个通道的一次变化
    ///
    /// 即使 delta 为 0 也会检查是否需要补发被去抖窗口挡住的事件。
    pub fn update(
        &mut self,
        motor: MotorId,
        previous_raw: u16,
        current_raw: u16,
        now: Instant,
    ) -> Option<CounterEvent> {
        let m = motor.index();
        let delta = i32::from(current_raw) - i32::from(previous_raw);

        if delta > 0 {
            self.cumulative[m] += delta as u64;
        } else if delta > ROLLOVER_THRESHOLD && delta < 0 {
            self.cumulative[m] += u64::from(current_raw);
        } else if delta <= ROLLOVER_THRESHOLD {
            warn!(
                "Counter {} rolled over: previous={}, current={}, delta={}",
                motor, previous_raw, current_raw, delta
            );
            self.cumulative[m] += (delta + 65_536) as u64;
        }

        self.check_emit(m, motor, now)
    }

    fn check_emit(&mut self, m: usize, motor: MotorId, now: Instant) -> Option<CounterEvent> {
        if self.cumulative[m] <= self.last_event_value[m] {
            return None;
        }
        let window_elapsed = match self.last_event_time[m] {
            Some(last) => now.saturating_duration_since(last) >= self.debounce,
            None => true,
        };
        if !window_elapsed {
            return None;
        }

        self.last_event_value[m] = self.cumulative[m];
        self.last_event_time[m] = Some(now);
        Some(CounterEvent {
            motor,
            value: self.cumulative[m],
        })
    }

    /// 处理一个完整快照的全部通道
    ///
    /// 基线快照只记录原始值。
    pub fn observe(&mut self, raw: [u16; MOTOR_COUNT], now: Instant) -> Vec<CounterEvent> {
        let previous = self.previous.replace(raw).unwrap_or(raw);
        MotorId::ALL
            .iter()
            .filter_map(|&motor| {
                let m = motor.index();
                self.update(motor, previous[m], raw[m], now)
            })
            .collect()
    }

    /// 丢弃上一周期原始值，下一个快照作为新基线（握手后调用）
    pub fn rebase(&mut self) {
        self.previous = None;
    }

    /// 累计值
    pub fn cumulative(&self, motor: MotorId) -> u64 {
        self.cumulative[motor.index()]
    }

    pub fn cumulative_all(&self) -> [u64; MOTOR_COUNT] {
        self.cumulative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn test_forward_progress() {
        let t0 = Instant::now();
        let mut tracker = CounterTracker::new();
        let event = tracker.update(MotorId::M1, 100, 150, t0);
        assert_eq!(tracker.cumulative(MotorId::M1), 50);
        assert_eq!(
            event,
            Some(CounterEvent {
                motor: MotorId::M1,
                value: 50
            })
        );
    }

    #[test]
    fn test_reset_adds_current_raw() {
        let mut tracker = CounterTracker::new();
        tracker.update(MotorId::M2, 0, 1000, Instant::now());
        // 计数器被复位后已经走了 7
        tracker.update(MotorId::M2, 1000, 7, Instant::now());
        assert_eq!(tracker.cumulative(MotorId::M2), 1007);
    }

    #[test]
    fn test_rollover() {
        let mut tracker = CounterTracker::new();
        tracker.update(MotorId::M3, 65530, 5, Instant::now());
        assert_eq!(tracker.cumulative(MotorId::M3), 11);
    }

    #[test]
    fn test_rollover_boundary() {
        let mut tracker = CounterTracker::new();
        // delta == -10000：按回绕处理
        tracker.update(MotorId::M1, 10_000, 0, Instant::now());
        assert_eq!(tracker.cumulative(MotorId::M1), 55_536);

        let mut tracker = CounterTracker::new();
        // delta == -9999：按复位处理
        tracker.update(MotorId::M1, 9_999, 0, Instant::now());
        assert_eq!(tracker.cumulative(MotorId::M1), 0);
    }

    #[test]
    fn test_debounce_reports_latest_value_once() {
        let t0 = Instant::now();
        let mut tracker = CounterTracker::new();

        assert!(tracker.update(MotorId::M4, 0, 5, t0).is_some());
        // 窗口内的两次增长都被抑制
        assert!(tracker.update(MotorId::M4, 5, 8, at(t0, 20)).is_none());
        assert!(tracker.update(MotorId::M4, 8, 12, at(t0, 60)).is_none());
        // 窗口结束后即使没有新增长也补发一次，携带最新值
        let event = tracker.update(MotorId::M4, 12, 12, at(t0, 100));
        assert_eq!(event.map(|e| e.value), Some(12));
        assert!(tracker.update(MotorId::M4, 12, 12, at(t0, 250)).is_none());
    }

    #[test]
    fn test_no_event_without_increase() {
        let mut tracker = CounterTracker::new();
        assert!(tracker.update(MotorId::M1, 40, 40, Instant::now()).is_none());
        assert!(tracker.update(MotorId::M1, 40, 0, Instant::now()).is_none());
        assert_eq!(tracker.cumulative(MotorId::M1), 0);
    }

    #[test]
    fn test_observe_uses_first_snapshot_as_baseline() {
        let t0 = Instant::now();
        let mut tracker = CounterTracker::new();

        assert!(tracker.observe([500, 0, 0, 0], t0).is_empty());
        assert_eq!(tracker.cumulative(MotorId::M1), 0);

        let events = tracker.observe([520, 0, 3, 0], at(t0, 20));
        assert_eq!(events.len(), 2);
        assert_eq!(tracker.cumulative_all(), [20, 0, 3, 0]);
    }

    #[test]
    fn test_cumulative_survives_rebase() {
        let t0 = Instant::now();
        let mut tracker = CounterTracker::new();
        tracker.observe([0, 0, 0, 0], t0);
        tracker.observe([30, 0, 0, 0], at(t0, 20));

        // 重连后控制器的计数器从任意值开始
        tracker.rebase();
        tracker.observe([9000, 0, 0, 0], at(t0, 40));
        assert_eq!(tracker.cumulative(MotorId::M1), 30);
        tracker.observe([9010, 0, 0, 0], at(t0, 60));
        assert_eq!(tracker.cumulative(MotorId::M1), 40);
    }
}
