//! 自动化状态机
//!
//! `AutomationController` 记录请求状态，并在 [`apply_requested_state`](AutomationController::apply_requested_state)
//! 时启动或取消后台流程线程。
//!
//! - 请求状态、运行标志、当前取消令牌由同一把锁保护
//! - 运行标志只由后台线程的生命周期改变（启动时置位，线程退出时清除）
//! - 流程退出（完成、取消或出错）后总是停止三个流程电机
//! - 链路断开时通过 [`LinkHook`] 取消正在运行的流程

pub mod motion;
pub mod procedure;
#[cfg(test)]
mod testing;

pub use motion::{AutomationTiming, CancelToken, MotionIo, MotionRunner, Move};
pub use procedure::{PICK_BOX_UP_AND_MOVE_LEFT, Procedure};

use crate::channel::Channel;
use crate::error::AutomationError;
use ftx_driver::{LinkHook, LinkState};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// 自动化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AutomationState {
    #[default]
    NotRunning = 0,
    Running = 1,
    /// 瞬态：取消当前流程并启动回零流程
    ResetRequested = 2,
}

impl AutomationState {
    /// 从调度器数值解析（`0`/`1`/`2`）
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NotRunning),
            1 => Some(Self::Running),
            2 => Some(Self::ResetRequested),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AutomationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutomationState::NotRunning => write!(f, "NotRunning"),
            AutomationState::Running => write!(f, "Running"),
            AutomationState::ResetRequested => write!(f, "ResetRequested"),
        }
    }
}

#[derive(Debug, Default)]
struct Flags {
    requested: AutomationState,
    running: bool,
    procedure: Procedure,
    /// 每启动一个后台线程加一；旧线程退出时不得改写新线程的状态
    generation: u64,
    cancel: Option<CancelToken>,
    worker: Option<JoinHandle<()>>,
}

/// 自动化控制器
pub struct AutomationController {
    io: Arc<dyn MotionIo>,
    timing: AutomationTiming,
    flags: Arc<Mutex<Flags>>,
}

impl AutomationController {
    pub fn new(io: Arc<dyn MotionIo>, timing: AutomationTiming) -> Self {
        Self {
            io,
            timing,
            flags: Arc::new(Mutex::new(Flags::default())),
        }
    }

    pub fn timing(&self) -> &AutomationTiming {
        &self.timing
    }

    /// 记录请求状态
    ///
    /// 与当前请求相同时返回 `false`，不做任何事。
    pub fn request_state(&self, state: AutomationState) -> bool {
        let mut flags = self.flags.lock();
        if flags.requested == state {
            debug!("Automation state {} already requested", state);
            return false;
        }
        debug!("Automation state requested: {} -> {}", flags.requested, state);
        flags.requested = state;
        true
    }

    pub fn requested_state(&self) -> AutomationState {
        self.flags.lock().requested
    }

    /// 后台流程是否在运行
    pub fn is_running(&self) -> bool {
        self.flags.lock().running
    }

    pub fn procedure(&self) -> Procedure {
        self.flags.lock().procedure
    }

    /// 选择流程
    ///
    /// 未知名称返回 `false`，保留当前选择。新选择在下一次启动时生效。
    pub fn set_procedure_name(&self, name: &str) -> bool {
        match name.parse::<Procedure>() {
            Ok(procedure) => {
                self.flags.lock().procedure = procedure;
                true
            },
            Err(e) => {
                warn!("{}", e);
                false
            },
        }
    }

    /// 执行请求状态
    ///
    /// 返回是否真的发生了状态变化；重复请求只记录日志。
    pub fn apply_requested_state(&self) -> Result<bool, AutomationError> {
        let requested = self.requested_state();
        match requested {
            AutomationState::NotRunning => {
                if !self.is_running() {
                    warn!("Automation stop requested while not running");
                    return Ok(false);
                }
                self.stop_and_join();
                Ok(true)
            },
            AutomationState::Running => {
                let mut flags = self.flags.lock();
                if flags.running {
                    warn!("Automation start requested while already running");
                    return Ok(false);
                }
                let procedure = flags.procedure;
                self.spawn_locked(&mut flags, procedure)?;
                Ok(true)
            },
            AutomationState::ResetRequested => {
                self.stop_and_join();
                let mut flags = self.flags.lock();
                self.spawn_locked(&mut flags, Procedure::Reset)?;
                // 回零流程占用运行状态，结束后回到 NotRunning
                flags.requested = AutomationState::Running;
                Ok(true)
            },
        }
    }

    /// 取消正在运行的流程并停止电机，不等待线程退出
    pub fn cancel(&self) {
        let flags = self.flags.lock();
        if let Some(token) = &flags.cancel {
            token.cancel();
        }
        drop(flags);
        self.io.stop_motors(&Channel::MOTORS);
    }

    /// 链路状态回调（弱引用，不延长控制器生命周期）
    pub fn link_hook(self: &Arc<Self>) -> Arc<dyn LinkHook> {
        Arc::new(AutomationLinkGuard {
            controller: Arc::downgrade(self),
        })
    }

    /// 取消、停止电机并等待后台线程退出
    fn stop_and_join(&self) {
        let worker = {
            let mut flags = self.flags.lock();
            if let Some(token) = &flags.cancel {
                token.cancel();
            }
            flags.worker.take()
        };
        self.io.stop_motors(&Channel::MOTORS);

        if let Some(worker) = worker
            && worker.join().is_err()
        {
            error!("Automation worker panicked");
        }
    }

    fn spawn_locked(&self, flags: &mut Flags, selected: Procedure) -> Result<(), AutomationError> {
        flags.generation += 1;
        let generation = flags.generation;
        let token = CancelToken::new();

        let io = Arc::clone(&self.io);
        let timing = self.timing.clone();
        let shared = Arc::clone(&self.flags);
        let worker_token = token.clone();
        let handle = std::thread::Builder::new()
            .name("ftx-automation".to_string())
            .spawn(move || {
                let runner = MotionRunner::new(io.as_ref(), &timing, &worker_token);
                match procedure::run(selected, &runner) {
                    Ok(()) => info!("Automation procedure {} finished", selected),
                    Err(AutomationError::Cancelled) => {
                        info!("Automation procedure {} cancelled", selected)
                    },
                    Err(e) => error!("Automation procedure {} failed: {}", selected, e),
                }
                io.stop_motors(&Channel::MOTORS);

                let mut flags = shared.lock();
                if flags.generation == generation {
                    flags.running = false;
                    flags.requested = AutomationState::NotRunning;
                    flags.cancel = None;
                }
            })
            .map_err(AutomationError::Spawn)?;

        flags.running = true;
        flags.cancel = Some(token);
        flags.worker = Some(handle);
        Ok(())
    }
}

impl Drop for AutomationController {
    fn drop(&mut self) {
        if let Some(token) = &self.flags.lock().cancel {
            token.cancel();
        }
    }
}

/// 链路断开时取消流程
struct AutomationLinkGuard {
    controller: Weak<AutomationController>,
}

impl LinkHook for AutomationLinkGuard {
    fn on_link_state(&self, previous: LinkState, current: LinkState) {
        if !current.is_disconnected() || previous.is_disconnected() {
            return;
        }
        if let Some(controller) = self.controller.upgrade()
            && controller.is_running()
        {
            warn!("Link lost, cancelling automation");
            controller.cancel();
        }
    }
}
