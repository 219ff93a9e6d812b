//! 驱动句柄
//!
//! `Driver` 持有共享上下文与当前 IO 会话。连接是惰性的：
//! 首次调用 [`Driver::connect`]（或 [`Driver::ensure_connected`]）时打开串口并握手，
//! 链路故障后由下一次请求重新连接。

use crate::error::{ConnectError, DriverError};
use crate::hooks::{EventHook, LinkHook};
use crate::link::LinkState;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{TransportConfig, handshake, io_loop};
use crate::registry::DeviceRegistry;
use crate::state::DriverContext;
use ftx_protocol::InputSnapshot;
use ftx_serial::Connector;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 关闭 IO 线程时的最长等待时间
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extension trait for timeout-capable thread joins
trait JoinTimeout<T> {
    fn join_timeout(self, timeout: Duration) -> Result<T, String>;
}

impl<T: Send + 'static> JoinTimeout<T> for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<T, String> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        // Watchdog thread joins the target thread
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err("thread panicked".to_string()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err("thread join timeout".to_string()),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err("thread panicked during join".to_string())
            },
        }
    }
}

/// 一次连接对应的 IO 线程
struct IoSession {
    is_running: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), DriverError>>,
}

impl IoSession {
    fn shutdown(self) {
        // Release: All writes before this are visible to the IO thread
        self.is_running.store(false, Ordering::Release);
        match self.handle.join_timeout(JOIN_TIMEOUT) {
            Ok(Ok(())) => {},
            Ok(Err(e)) => info!("IO thread had exited: {}", e),
            Err(e) => error!("IO thread failed to shut down within {:?}: {}", JOIN_TIMEOUT, e),
        }
    }
}

/// ROBO TX 控制器驱动
pub struct Driver {
    ctx: Arc<DriverContext>,
    connector: Arc<dyn Connector>,
    config: TransportConfig,
    /// 连接锁：串行化 connect，持有当前 IO 会话
    session: Mutex<Option<IoSession>>,
}

impl Driver {
    /// 创建驱动（不连接）
    pub fn new(
        connector: Arc<dyn Connector>,
        config: TransportConfig,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Self {
        let ctx = Arc::new(DriverContext::new(
            registry,
            config.event_debounce(),
            config.liveness_timeout(),
            config.safety_interlock,
        ));
        Self {
            ctx,
            connector,
            config,
            session: Mutex::new(None),
        }
    }

    /// 打开串口、握手并启动传输循环
    ///
    /// 已经连接时直接返回。链路断开后残留的 IO 线程会先被回收。
    pub fn connect(&self) -> Result<(), DriverError> {
        let mut session = self.session.lock();
        if !self.ctx.link_state().is_disconnected() && session.is_some() {
            return Ok(());
        }
        if let Some(old) = session.take() {
            old.shutdown();
        }

        info!("Connecting to {}", self.connector.describe());
        let mut port = self.connector.connect().map_err(ConnectError::from)?;
        let tokens = handshake(port.as_mut(), &self.ctx, &self.config)?;
        info!("Connected to {}", port.port_name());

        let is_running = Arc::new(AtomicBool::new(true));
        let ctx = Arc::clone(&self.ctx);
        let config = self.config.clone();
        let running = Arc::clone(&is_running);
        let handle = std::thread::Builder::new()
            .name("ftx-io".to_string())
            .spawn(move || io_loop(port, ctx, config, tokens, running))
            .map_err(|e| {
                self.ctx.set_link_state(LinkState::Disconnected);
                ConnectError::PortError(ftx_serial::SerialError::Io(e))
            })?;

        *session = Some(IoSession { is_running, handle });
        Ok(())
    }

    /// 未连接时连接
    pub fn ensure_connected(&self) -> Result<(), DriverError> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect()
    }

    /// 主动断开：停止 IO 线程并释放串口
    pub fn disconnect(&self) {
        if let Some(session) = self.session.lock().take() {
            session.shutdown();
        }
        self.ctx.set_link_state(LinkState::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        !self.ctx.link_state().is_disconnected()
    }

    pub fn link_state(&self) -> LinkState {
        self.ctx.link_state()
    }

    /// 共享上下文（自动化与调度器通过它读写 IO）
    pub fn context(&self) -> &Arc<DriverContext> {
        &self.ctx
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// 最近发布的输入快照
    pub fn snapshot(&self) -> Arc<InputSnapshot> {
        self.ctx.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 距离最近一次有效响应的时间
    pub fn time_since_last_response(&self) -> Duration {
        self.ctx.liveness.time_since_last_response()
    }

    /// 控制器在超时窗口内有响应
    pub fn is_alive(&self) -> bool {
        self.is_connected() && self.ctx.liveness.is_alive()
    }

    pub fn add_event_hook(&self, hook: Arc<dyn EventHook>) {
        self.ctx.add_event_hook(hook);
    }

    pub fn add_link_hook(&self, hook: Arc<dyn LinkHook>) {
        self.ctx.add_link_hook(hook);
    }

    /// 等待至少 `cycles` 个新的交换周期完成
    ///
    /// # 错误
    /// - `LinkDown`: 等待期间链路断开
    /// - `Timeout`: 超时
    pub fn wait_for_cycles(&self, cycles: u64, timeout: Duration) -> Result<(), DriverError> {
        let target = self.ctx.metrics.snapshot().cycles_total + cycles;
        let deadline = Instant::now() + timeout;
        loop {
            if self.ctx.metrics.cycles_total.load(Ordering::Relaxed) >= target {
                return Ok(());
            }
            if self.ctx.link_state().is_disconnected() {
                return Err(DriverError::LinkDown);
            }
            if Instant::now() >= deadline {
                warn!("Timed out waiting for {} exchange cycle(s)", cycles);
                return Err(DriverError::Timeout);
            }
            spin_sleep::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.shutdown();
        }
    }
}
