//! 运动原语：回零与计数移动
//!
//! 原语只通过 [`MotionIo`] 读输入、写输出，不直接持有驱动；
//! 所有等待都经过 [`CancelToken::sleep`]，每次醒来都检查取消。

use crate::channel::{Channel, Direction};
use crate::error::{AutomationError, StuckMotion};
use ftx_driver::DriverContext;
use ftx_protocol::{InputId, MotorId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 单次休眠的最长切片
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// 回零时未设目标距离
const NO_DISTANCE: Option<u16> = None;

/// 自动化流程访问输入输出的接口
///
/// 由 [`DriverContext`] 实现；测试中可以换成模拟机械臂。
pub trait MotionIo: Send + Sync {
    fn is_pressed(&self, input: InputId) -> bool;

    /// 最近快照中的原始计数器
    fn raw_counter(&self, motor: MotorId) -> u16;

    /// 在同一次加锁内设置目标距离（可选）与占空比
    fn drive(&self, motor: MotorId, power: i16, distance: Option<u16>);

    fn reset_counter(&self, motor: MotorId);

    fn stop_motors(&self, motors: &[MotorId]);
}

impl MotionIo for DriverContext {
    fn is_pressed(&self, input: InputId) -> bool {
        DriverContext::is_pressed(self, input)
    }

    fn raw_counter(&self, motor: MotorId) -> u16 {
        DriverContext::raw_counter(self, motor)
    }

    fn drive(&self, motor: MotorId, power: i16, distance: Option<u16>) {
        self.with_output(|cmd| {
            if let Some(distance) = distance {
                cmd.set_distance(motor, distance);
            }
            cmd.set_duty(motor, power);
        });
    }

    fn reset_counter(&self, motor: MotorId) {
        DriverContext::reset_counter(self, motor)
    }

    fn stop_motors(&self, motors: &[MotorId]) {
        DriverContext::stop_motors(self, motors)
    }
}

/// 自动化时序参数
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AutomationTiming {
    /// 回零时轮询限位输入的间隔（毫秒）
    pub home_poll_ms: u64,
    /// 限位触发后继续驱动的时间（毫秒），吃掉机械间隙
    pub home_hold_ms: u64,
    /// 单个回零步骤的上限（毫秒）
    pub home_timeout_ms: u64,
    /// 计数器复位后等待控制器生效的时间（毫秒）
    pub settle_ms: u64,
    /// 计数移动轮询计数器的间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl Default for AutomationTiming {
    fn default() -> Self {
        Self {
            home_poll_ms: 5,
            home_hold_ms: 20,
            home_timeout_ms: 30_000,
            settle_ms: 100,
            poll_interval_ms: 150,
        }
    }
}

impl AutomationTiming {
    pub fn home_poll(&self) -> Duration {
        Duration::from_millis(self.home_poll_ms)
    }

    pub fn home_hold(&self) -> Duration {
        Duration::from_millis(self.home_hold_ms)
    }

    pub fn home_timeout(&self) -> Duration {
        Duration::from_millis(self.home_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 协作式取消令牌（克隆共享同一标志）
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 已取消时返回 `Err(Cancelled)`
    pub fn check(&self) -> Result<(), AutomationError> {
        if self.is_cancelled() {
            return Err(AutomationError::Cancelled);
        }
        Ok(())
    }

    /// 可取消的休眠
    ///
    /// 按 10ms 切片休眠，每次醒来检查取消。
    pub fn sleep(&self, duration: Duration) -> Result<(), AutomationError> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// 计数移动步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub channel: Channel,
    pub direction: Direction,
    /// 目标计数
    pub target: u16,
}

impl Move {
    pub const fn new(channel: Channel, direction: Direction, target: u16) -> Self {
        Self {
            channel,
            direction,
            target,
        }
    }
}

/// 在一个取消令牌下执行运动原语
pub struct MotionRunner<'a> {
    io: &'a dyn MotionIo,
    timing: &'a AutomationTiming,
    cancel: &'a CancelToken,
}

impl<'a> MotionRunner<'a> {
    pub fn new(io: &'a dyn MotionIo, timing: &'a AutomationTiming, cancel: &'a CancelToken) -> Self {
        Self { io, timing, cancel }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.cancel
    }

    /// 回零：朝限位方向驱动直到限位输入触发
    ///
    /// 限位已触发时什么也不做。触发后继续驱动 `home_hold` 再停止。
    /// 超过 `home_timeout` 时停止电机并返回 `HomeTimeout`。
    pub fn home(&self, channel: Channel) -> Result<(), AutomationError> {
        self.cancel.check()?;
        let limit = channel.limit_input();
        if self.io.is_pressed(limit) {
            trace!("{} already at {}", channel, limit);
            return Ok(());
        }

        debug!("Homing {} toward {}", channel, limit);
        let motor = channel.motor();
        self.io
            .drive(motor, channel.home_direction().duty(), NO_DISTANCE);

        let started = Instant::now();
        while !self.io.is_pressed(limit) {
            if started.elapsed() >= self.timing.home_timeout() {
                self.io.stop_motors(&[motor]);
                return Err(AutomationError::HomeTimeout {
                    channel,
                    timeout_ms: self.timing.home_timeout_ms,
                });
            }
            self.cancel.sleep(self.timing.home_poll())?;
        }

        self.cancel.sleep(self.timing.home_hold())?;
        self.io.stop_motors(&[motor]);
        debug!("{} homed in {:?}", channel, started.elapsed());
        Ok(())
    }

    /// 计数移动：复位计数器后驱动电机，直到计数达到目标
    ///
    /// 两次相邻轮询读到相同计数时堵转计数加一（整个步骤内不清零），
    /// 超过通道阈值返回 `StuckMotion`，电机保持运行。
    /// 达到目标时不主动停止，控制器按目标距离自行停车。
    pub fn counted_move(&self, step: &Move) -> Result<(), AutomationError> {
        self.cancel.check()?;
        let motor = step.channel.motor();
        debug!(
            "Moving {} {:?} to counter {}",
            step.channel, step.direction, step.target
        );

        self.io.reset_counter(motor);
        self.cancel.sleep(self.timing.settle())?;
        self.io
            .drive(motor, step.direction.duty(), Some(step.target));

        let limit = step.channel.stall_limit();
        let mut previous = self.io.raw_counter(motor);
        let mut stalls: u32 = 0;
        loop {
            self.cancel.sleep(self.timing.poll_interval())?;
            let current = self.io.raw_counter(motor);
            if current >= step.target {
                debug!("{} reached {} (target {})", step.channel, current, step.target);
                return Ok(());
            }
            if current == previous {
                stalls += 1;
                if stalls > limit {
                    return Err(StuckMotion {
                        channel: step.channel,
                        target: step.target,
                        counter: current,
                        stalls,
                    }
                    .into());
                }
            }
            previous = current;
        }
    }

    /// 步骤级失败只记录，取消继续向上传播
    pub fn tolerate(&self, result: Result<(), AutomationError>) -> Result<(), AutomationError> {
        match result {
            Err(e) if e.is_step_failure() => {
                warn!("Step abandoned: {}", e);
                Ok(())
            },
            other => other,
        }
    }
}
