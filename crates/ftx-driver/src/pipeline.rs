//! 传输循环（Pipeline）逻辑
//!
//! 负责握手、周期交换、帧累积读取、快照发布与故障恢复。
//! 只有传输循环线程访问串口。

use crate::error::DriverError;
use crate::link::LinkState;
use crate::metrics::DriverMetrics;
use crate::state::DriverContext;
use ftx_protocol::{
    CodecError, FrameKind, InputId, InputSnapshot, LENGTH_COVERAGE_START, MotorId,
    OutputCommand, RX_BUFFER_LEN, SessionTokens, TRAILER_LEN, decode, encode, encode_configure,
    offsets, parse_frame,
};
use ftx_serial::{SerialAdapter, SerialError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// 传输循环配置
///
/// 使用毫秒整数字段，可直接从配置文件反序列化。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TransportConfig {
    /// 交换周期（毫秒）
    pub cycle_period_ms: u64,
    /// 每周期最多读取次数（一次写入之后）
    pub max_read_retries: u32,
    /// 连续失败多少个周期后判定传输故障
    pub max_consecutive_failures: u32,
    /// 多久没有有效响应视为控制器失联（毫秒，仅用于监控）
    pub liveness_timeout_ms: u64,
    /// 计数事件去抖窗口（毫秒）
    pub event_debounce_ms: u64,
    /// 启动时是否启用安全联锁
    pub safety_interlock: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: 20,
            max_read_retries: 5,
            max_consecutive_failures: 3,
            liveness_timeout_ms: 1000,
            event_debounce_ms: 100,
            safety_interlock: false,
        }
    }
}

impl TransportConfig {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn event_debounce(&self) -> Duration {
        Duration::from_millis(self.event_debounce_ms)
    }
}

/// 单个周期的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 收到交换响应并发布了新快照
    Exchanged,
    /// 收到非交换响应，只更新了令牌
    TokensOnly,
    /// 收到复位哨兵，需要重新握手
    DeviceReset,
}

/// 安全联锁
///
/// | 输入 | 条件 | 被阻止的方向 |
/// |---|---|---|
/// | I7 | 按下 | M1 反向 |
/// | I8 | 按下 | M1 正向 |
/// | I5 | 松开 | M2 反向 |
/// | I6 | 松开 | M2 正向 |
///
/// 返回被清零的电机数。
pub fn apply_interlock(snapshot: &InputSnapshot, cmd: &mut OutputCommand) -> u32 {
    let pressed = |n: u8| InputId::new(n).is_some_and(|input| snapshot.is_pressed(input));
    let mut clamps = 0;

    let m1 = cmd.duty(MotorId::M1);
    if (m1 < 0 && pressed(7)) || (m1 > 0 && pressed(8)) {
        cmd.stop(MotorId::M1);
        clamps += 1;
    }

    let m2 = cmd.duty(MotorId::M2);
    if (m2 < 0 && !pressed(5)) || (m2 > 0 && !pressed(6)) {
        cmd.stop(MotorId::M2);
        clamps += 1;
    }

    if clamps > 0 {
        trace!("Safety interlock clamped {} motor(s)", clamps);
    }
    clamps
}

/// 读取一帧
///
/// 按长度字段累积多次读取，直到收到完整帧或读取次数耗尽。
/// 返回帧长度（帧位于 `buf[..len]`）。
pub fn read_frame(
    port: &mut dyn SerialAdapter,
    buf: &mut [u8],
    max_reads: u32,
    metrics: &DriverMetrics,
) -> Result<usize, DriverError> {
    let mut filled = 0;
    let mut expected: Option<usize> = None;

    for attempt in 0..max_reads.max(1) {
        if attempt > 0 {
            metrics.read_retries.fetch_add(1, Ordering::Relaxed);
        }

        match port.read(&mut buf[filled..]) {
            Ok(n) => filled += n,
            Err(e) if e.is_transient() => {
                trace!("Read attempt {} timed out ({} bytes so far)", attempt + 1, filled);
                continue;
            },
            Err(e) => return Err(e.into()),
        }

        if expected.is_none() && filled >= LENGTH_COVERAGE_START {
            let length = usize::from(u16::from_be_bytes([
                buf[offsets::LENGTH],
                buf[offsets::LENGTH + 1],
            ]));
            let total = LENGTH_COVERAGE_START + length + TRAILER_LEN;
            if total > buf.len() {
                return Err(CodecError::MalformedField {
                    field: "length",
                    offset: offsets::LENGTH,
                }
                .into());
            }
            expected = Some(total);
        }
        if let Some(total) = expected
            && filled >= total
        {
            return Ok(total);
        }
        if filled == buf.len() {
            break;
        }
    }

    if filled == 0 {
        return Err(SerialError::Timeout.into());
    }
    Err(CodecError::ShortFrame {
        expected: expected.unwrap_or(LENGTH_COVERAGE_START),
        actual: filled,
    }
    .into())
}

fn exchange_configure(
    port: &mut dyn SerialAdapter,
    ctx: &DriverContext,
    config: &TransportConfig,
) -> Result<SessionTokens, DriverError> {
    if let Err(e) = port.discard_input() {
        warn!("Failed to discard stale input on {}: {}", port.port_name(), e);
    }
    let frame = encode_configure(SessionTokens::default());
    debug!(port = port.port_name(), frame = %hex::encode(&frame), "Sending configure frame");
    port.write_frame(&frame)?;

    let mut buf = [0u8; RX_BUFFER_LEN];
    let len = read_frame(port, &mut buf, config.max_read_retries, &ctx.metrics)?;
    debug!(response = %hex::encode(&buf[..len]), "Configure response");
    Ok(SessionTokens::from_response(&buf[..len])?)
}

/// 握手：发送配置帧，提取会话令牌
///
/// 成功后链路进入 `Streaming`，计数器重新取基线；失败则进入 `Disconnected`。
pub fn handshake(
    port: &mut dyn SerialAdapter,
    ctx: &DriverContext,
    config: &TransportConfig,
) -> Result<SessionTokens, DriverError> {
    ctx.set_link_state(LinkState::Handshaking);

    match exchange_configure(port, ctx, config) {
        Ok(tokens) => {
            ctx.rebase_counters();
            ctx.liveness.register_response();
            ctx.metrics.handshakes.fetch_add(1, Ordering::Relaxed);
            debug!("Handshake complete: tid={}, sid={}", tokens.tid, tokens.sid);
            ctx.set_link_state(LinkState::Streaming);
            Ok(tokens)
        },
        Err(e) => {
            warn!("Handshake failed: {}", e);
            ctx.set_link_state(LinkState::Disconnected);
            Err(e)
        },
    }
}

/// 执行一个交换周期
///
/// 写出当前输出命令，读取响应，更新令牌；交换响应解码后发布快照。
pub fn run_cycle(
    port: &mut dyn SerialAdapter,
    ctx: &DriverContext,
    tokens: &mut SessionTokens,
    config: &TransportConfig,
    rx_buf: &mut [u8],
) -> Result<CycleOutcome, DriverError> {
    let frame = ctx.with_output(|cmd| encode(cmd, *tokens));
    port.write_frame(&frame)?;

    let len = read_frame(port, rx_buf, config.max_read_retries, &ctx.metrics)?;
    let bytes = &rx_buf[..len];
    let parsed = parse_frame(bytes)?;
    *tokens = SessionTokens::following(&parsed.header);
    ctx.liveness.register_response();

    if parsed.header.kind != FrameKind::ExchangeResponse {
        debug!("Non-exchange response {:?}, tokens updated only", parsed.header.kind);
        return Ok(CycleOutcome::TokensOnly);
    }

    let snapshot = decode(bytes)?;
    if snapshot.is_reset_sentinel() {
        return Ok(CycleOutcome::DeviceReset);
    }

    ctx.publish(snapshot, Instant::now());
    ctx.metrics.cycles_total.fetch_add(1, Ordering::Relaxed);
    Ok(CycleOutcome::Exchanged)
}

/// 传输循环主函数
///
/// 在握手完成后由 `Driver` 在独立线程中启动。退出条件：
/// - `is_running` 被置为 false（`Driver` 被 drop 或主动断开）
/// - 连续失败周期数达到上限（`TransportFault`）
/// - 复位哨兵之后的重新握手失败（`DeviceReset`）
///
/// 退出时链路置为 `Disconnected`，串口随 `port` 一起释放。
pub fn io_loop(
    mut port: Box<dyn SerialAdapter + Send>,
    ctx: Arc<DriverContext>,
    config: TransportConfig,
    mut tokens: SessionTokens,
    is_running: Arc<AtomicBool>,
) -> Result<(), DriverError> {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;
        use tracing::info;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("IO thread priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set IO thread priority: {:?}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    let period = config.cycle_period();
    let mut rx_buf = [0u8; RX_BUFFER_LEN];
    let mut consecutive_failures: u32 = 0;

    let result = loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("IO thread: is_running flag is false, exiting");
            break Ok(());
        }
        let started = Instant::now();

        match run_cycle(port.as_mut(), &ctx, &mut tokens, &config, &mut rx_buf) {
            Ok(CycleOutcome::Exchanged) | Ok(CycleOutcome::TokensOnly) => {
                consecutive_failures = 0;
            },
            Ok(CycleOutcome::DeviceReset) => {
                ctx.metrics.device_resets.fetch_add(1, Ordering::Relaxed);
                warn!("Device reset sentinel received, re-running handshake");
                ctx.set_link_state(LinkState::Disconnected);
                match handshake(port.as_mut(), &ctx, &config) {
                    Ok(new_tokens) => {
                        tokens = new_tokens;
                        consecutive_failures = 0;
                    },
                    Err(e) => {
                        error!("Re-handshake after device reset failed: {}", e);
                        break Err(DriverError::DeviceReset);
                    },
                }
            },
            Err(e) => {
                consecutive_failures += 1;
                ctx.metrics.cycles_failed.fetch_add(1, Ordering::Relaxed);
                if matches!(e, DriverError::Codec(_)) {
                    ctx.metrics.codec_errors.fetch_add(1, Ordering::Relaxed);
                }
                warn!(
                    "Exchange cycle failed ({}/{}): {}",
                    consecutive_failures, config.max_consecutive_failures, e
                );
                if consecutive_failures >= config.max_consecutive_failures {
                    ctx.metrics.transport_faults.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Transport fault on {}: {} consecutive failed cycles",
                        port.port_name(),
                        consecutive_failures
                    );
                    break Err(DriverError::TransportFault {
                        failures: consecutive_failures,
                    });
                }
            },
        }

        // 节拍控制：使用 spin_sleep 获得亚毫秒精度
        let elapsed = started.elapsed();
        if elapsed < period {
            spin_sleep::sleep(period - elapsed);
        } else {
            ctx.metrics.overruns.fetch_add(1, Ordering::Relaxed);
            trace!("Cycle overrun: {:?} > {:?}", elapsed, period);
        }
    };

    ctx.set_link_state(LinkState::Disconnected);
    debug!("IO thread: loop exited, releasing {}", port.port_name());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticRegistry;
    use ftx_protocol::{FRAME_START, encode_response};

    struct ScriptedPort {
        reads: Vec<Result<Vec<u8>, SerialError>>,
        written: Vec<Vec<u8>>,
    }

    impl ScriptedPort {
        fn new(mut reads: Vec<Result<Vec<u8>, SerialError>>) -> Self {
            reads.reverse();
            Self {
                reads,
                written: Vec::new(),
            }
        }
    }

    impl SerialAdapter for ScriptedPort {
        fn write_frame(&mut self, frame: &[u8]) -> Result<(), SerialError> {
            self.written.push(frame.to_vec());
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
            match self.reads.pop() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                },
                Some(Err(e)) => Err(e),
                None => Err(SerialError::Timeout),
            }
        }

        fn port_name(&self) -> &str {
            "scripted"
        }
    }

    fn context() -> DriverContext {
        DriverContext::new(
            Arc::new(StaticRegistry::default()),
            Duration::from_millis(100),
            Duration::from_secs(1),
            false,
        )
    }

    fn pressed(inputs: &[usize]) -> InputSnapshot {
        let mut snapshot = InputSnapshot::default();
        for &n in inputs {
            snapshot.digital_in[n - 1] = 1;
        }
        snapshot
    }

    #[test]
    fn test_interlock_table() {
        // I7 按下：M1 反向被阻止，正向放行
        let mut cmd = OutputCommand::new();
        cmd.set_duty(MotorId::M1, -512);
        cmd.set_duty(MotorId::M2, 0);
        assert_eq!(apply_interlock(&pressed(&[5, 6, 7]), &mut cmd), 1);
        assert_eq!(cmd.duty(MotorId::M1), 0);

        cmd.set_duty(MotorId::M1, 512);
        assert_eq!(apply_interlock(&pressed(&[5, 6, 7]), &mut cmd), 0);
        assert_eq!(cmd.duty(MotorId::M1), 512);

        // I8 按下：M1 正向被阻止
        assert_eq!(apply_interlock(&pressed(&[5, 6, 8]), &mut cmd), 1);
        assert_eq!(cmd.duty(MotorId::M1), 0);

        // I5 松开：M2 反向被阻止
        cmd.set_duty(MotorId::M2, -200);
        assert_eq!(apply_interlock(&pressed(&[6]), &mut cmd), 1);
        assert_eq!(cmd.duty(MotorId::M2), 0);

        // I6 松开：M2 正向被阻止
        cmd.set_duty(MotorId::M2, 200);
        assert_eq!(apply_interlock(&pressed(&[5]), &mut cmd), 1);
        assert_eq!(cmd.duty(MotorId::M2), 0);

        // I5/I6 都按下：M2 双向放行
        cmd.set_duty(MotorId::M2, 200);
        assert_eq!(apply_interlock(&pressed(&[5, 6]), &mut cmd), 0);
        assert_eq!(cmd.duty(MotorId::M2), 200);
    }

    #[test]
    fn test_read_frame_accumulates_chunks() {
        let frame = encode_response(&InputSnapshot::default(), SessionTokens::default());
        let mut port = ScriptedPort::new(vec![
            Ok(frame[..3].to_vec()),
            Err(SerialError::Timeout),
            Ok(frame[3..50].to_vec()),
            Ok(frame[50..].to_vec()),
        ]);
        let metrics = DriverMetrics::new();
        let mut buf = [0u8; RX_BUFFER_LEN];

        let len = read_frame(&mut port, &mut buf, 5, &metrics).unwrap();
        assert_eq!(len, frame.len());
        assert_eq!(&buf[..len], &frame[..]);
        assert_eq!(metrics.snapshot().read_retries, 3);
    }

    #[test]
    fn test_read_frame_exhausted() {
        let metrics = DriverMetrics::new();
        let mut buf = [0u8; RX_BUFFER_LEN];

        let mut port = ScriptedPort::new(vec![]);
        assert!(matches!(
            read_frame(&mut port, &mut buf, 3, &metrics),
            Err(DriverError::Serial(SerialError::Timeout))
        ));

        let mut port = ScriptedPort::new(vec![Ok(FRAME_START.to_vec())]);
        assert!(matches!(
            read_frame(&mut port, &mut buf, 3, &metrics),
            Err(DriverError::Codec(CodecError::ShortFrame { actual: 2, .. }))
        ));
    }

    #[test]
    fn test_read_frame_rejects_oversized_length() {
        let metrics = DriverMetrics::new();
        let mut buf = [0u8; RX_BUFFER_LEN];
        let mut port = ScriptedPort::new(vec![Ok(vec![0x02, 0x55, 0xFF, 0xFF])]);
        assert!(matches!(
            read_frame(&mut port, &mut buf, 3, &metrics),
            Err(DriverError::Codec(CodecError::MalformedField { field: "length", .. }))
        ));
    }

    #[test]
    fn test_read_frame_fatal_error() {
        let metrics = DriverMetrics::new();
        let mut buf = [0u8; RX_BUFFER_LEN];
        let mut port = ScriptedPort::new(vec![Err(SerialError::Disconnected)]);
        assert!(matches!(
            read_frame(&mut port, &mut buf, 3, &metrics),
            Err(DriverError::Serial(SerialError::Disconnected))
        ));
    }

    #[test]
    fn test_handshake_extracts_tokens() {
        let ctx = context();
        let response = ftx_protocol::build_frame(
            FrameKind::ConfigureResponse,
            SessionTokens { tid: 1, sid: 0x0A0B },
            &[],
        );
        let mut port = ScriptedPort::new(vec![Ok(response.to_vec())]);

        let tokens = handshake(&mut port, &ctx, &TransportConfig::default()).unwrap();
        assert_eq!(tokens, SessionTokens { tid: 2, sid: 0x0A0B });
        assert_eq!(ctx.link_state(), LinkState::Streaming);
        assert_eq!(port.written.len(), 1);
        assert_eq!(port.written[0][16], 5);
    }

    #[test]
    fn test_handshake_failure_disconnects() {
        let ctx = context();
        let mut port = ScriptedPort::new(vec![Ok(vec![0x02, 0x55, 0x00])]);
        assert!(handshake(&mut port, &ctx, &TransportConfig::default()).is_err());
        assert_eq!(ctx.link_state(), LinkState::Disconnected);
    }

    #[test]
    fn test_run_cycle_updates_tokens_and_snapshot() {
        let ctx = context();
        let mut snapshot = InputSnapshot::default();
        snapshot.digital_in[0] = 1;
        let response = encode_response(&snapshot, SessionTokens { tid: 10, sid: 4 });
        let mut port = ScriptedPort::new(vec![Ok(response.to_vec())]);
        let mut tokens = SessionTokens { tid: 10, sid: 4 };
        let mut buf = [0u8; RX_BUFFER_LEN];

        let outcome =
            run_cycle(&mut port, &ctx, &mut tokens, &TransportConfig::default(), &mut buf)
                .unwrap();
        assert_eq!(outcome, CycleOutcome::Exchanged);
        assert_eq!(tokens, SessionTokens { tid: 11, sid: 4 });
        assert!(ctx.is_pressed(InputId::new(1).unwrap()));
        assert_eq!(port.written[0].len(), 75);
    }

    #[test]
    fn test_run_cycle_non_exchange_response_keeps_snapshot() {
        let ctx = context();
        let response = ftx_protocol::build_frame(
            FrameKind::ConfigureResponse,
            SessionTokens { tid: 20, sid: 1 },
            &[],
        );
        let mut port = ScriptedPort::new(vec![Ok(response.to_vec())]);
        let mut tokens = SessionTokens::default();
        let mut buf = [0u8; RX_BUFFER_LEN];

        let outcome =
            run_cycle(&mut port, &ctx, &mut tokens, &TransportConfig::default(), &mut buf)
                .unwrap();
        assert_eq!(outcome, CycleOutcome::TokensOnly);
        assert_eq!(tokens, SessionTokens { tid: 21, sid: 1 });
        assert_eq!(*ctx.snapshot(), InputSnapshot::default());
    }

    #[test]
    fn test_run_cycle_detects_sentinel() {
        let ctx = context();
        let mut snapshot = InputSnapshot::default();
        snapshot.digital_in[0] = ftx_protocol::DEVICE_RESET_SENTINEL;
        let response = encode_response(&snapshot, SessionTokens::default());
        let mut port = ScriptedPort::new(vec![Ok(response.to_vec())]);
        let mut tokens = SessionTokens::default();
        let mut buf = [0u8; RX_BUFFER_LEN];

        let outcome =
            run_cycle(&mut port, &ctx, &mut tokens, &TransportConfig::default(), &mut buf)
                .unwrap();
        assert_eq!(outcome, CycleOutcome::DeviceReset);
        // 哨兵快照不发布
        assert!(!ctx.snapshot().is_reset_sentinel());
    }
}
