//! 传输循环端到端测试
//!
//! 使用模拟控制器验证：
//! 1. 握手、周期交换与令牌推进
//! 2. 输入与计数事件
//! 3. 复位哨兵后的重新握手
//! 4. 连续失败后的传输故障与重新连接

use ftx_driver::{
    ChannelEventHook, ConnectError, DeviceEvent, DriverBuilder, DriverError, LinkHook,
    LinkState, StaticRegistry, TransportConfig,
};
use ftx_protocol::MotorId;
use ftx_serial::MockController;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

/// 记录所有链路状态变化
#[derive(Default)]
struct LinkRecorder {
    transitions: Mutex<Vec<(LinkState, LinkState)>>,
}

impl LinkHook for LinkRecorder {
    fn on_link_state(&self, previous: LinkState, current: LinkState) {
        self.transitions.lock().push((previous, current));
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn fast_config() -> TransportConfig {
    TransportConfig {
        cycle_period_ms: 2,
        max_read_retries: 2,
        ..Default::default()
    }
}

#[test]
fn test_connect_handshake_and_stream() {
    let mock = MockController::new();
    let registry = Arc::new(StaticRegistry::new("rig"));
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(fast_config())
        .registry(registry.clone())
        .connect()
        .unwrap();

    assert_eq!(driver.link_state(), LinkState::Streaming);
    assert!(registry.is_enabled());
    driver.wait_for_cycles(5, WAIT).unwrap();

    assert_eq!(mock.connects(), 1);
    assert_eq!(mock.handshakes(), 1);
    // 会话号来自配置响应
    let tokens = mock.last_tokens().unwrap();
    assert_eq!(tokens.sid, 1);
    assert!(tokens.tid > 1);
    assert!(driver.is_alive());
    assert!(driver.metrics().cycles_total >= 5);
}

#[test]
fn test_connect_is_idempotent() {
    let mock = MockController::new();
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(fast_config())
        .build()
        .unwrap();

    assert!(!driver.is_connected());
    driver.ensure_connected().unwrap();
    driver.ensure_connected().unwrap();
    driver.connect().unwrap();
    assert_eq!(mock.connects(), 1);
}

#[test]
fn test_output_reaches_controller() {
    let mock = MockController::new();
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(fast_config())
        .connect()
        .unwrap();

    driver.context().set_duty(MotorId::M3, -512);
    driver.wait_for_cycles(3, WAIT).unwrap();
    assert_eq!(mock.last_command().duty(MotorId::M3), -512);
}

#[test]
fn test_input_change_emits_event() {
    let mock = MockController::new();
    let (hook, rx) = ChannelEventHook::new(64);
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(fast_config())
        .registry(Arc::new(StaticRegistry::new("rig")))
        .event_hook(Arc::new(hook))
        .connect()
        .unwrap();
    driver.wait_for_cycles(2, WAIT).unwrap();

    mock.set_input(3, true);
    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(event, DeviceEvent::new("rig", "I3", "1"));

    mock.set_input(3, false);
    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(event, DeviceEvent::new("rig", "I3", "0"));
}

#[test]
fn test_counter_events_accumulate() {
    let mock = MockController::new();
    mock.set_counter_step(1, 7);
    let (hook, rx) = ChannelEventHook::new(256);
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(fast_config())
        .event_hook(Arc::new(hook))
        .connect()
        .unwrap();

    driver.context().set_duty(MotorId::M1, 512);
    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(event.interface, "CC1");
    let value: u64 = event.value.parse().unwrap();
    assert!(value > 0);
    assert_eq!(value % 7, 0);

    driver.context().set_duty(MotorId::M1, 0);
    driver.wait_for_cycles(3, WAIT).unwrap();
    assert_eq!(driver.context().cumulative(MotorId::M1) % 7, 0);
    assert!(driver.context().cumulative(MotorId::M1) >= value);
}

#[test]
fn test_chunked_responses_are_reassembled() {
    let mock = MockController::new();
    mock.set_chunk_size(Some(7));
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(TransportConfig {
            cycle_period_ms: 2,
            max_read_retries: 16,
            ..Default::default()
        })
        .connect()
        .unwrap();

    driver.wait_for_cycles(5, WAIT).unwrap();
    assert!(driver.metrics().read_retries > 0);
    assert_eq!(driver.metrics().cycles_failed, 0);
}

#[test]
fn test_reset_sentinel_triggers_rehandshake() {
    let mock = MockController::new();
    let recorder = Arc::new(LinkRecorder::default());
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(fast_config())
        .link_hook(recorder.clone())
        .connect()
        .unwrap();
    driver.wait_for_cycles(2, WAIT).unwrap();

    mock.inject_reset_sentinel();
    assert!(wait_until(WAIT, || mock.handshakes() == 2));
    driver.wait_for_cycles(2, WAIT).unwrap();

    assert_eq!(driver.link_state(), LinkState::Streaming);
    assert_eq!(driver.metrics().device_resets, 1);
    // 同一个串口上重新握手，不重新打开
    assert_eq!(mock.connects(), 1);
    assert_eq!(mock.last_tokens().unwrap().sid, 2);
    assert!(
        recorder
            .transitions
            .lock()
            .contains(&(LinkState::Streaming, LinkState::Disconnected))
    );
}

#[test]
fn test_transport_fault_then_reconnect() {
    let mock = MockController::new();
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(fast_config())
        .connect()
        .unwrap();
    driver.wait_for_cycles(2, WAIT).unwrap();

    mock.drop_responses(3);
    assert!(wait_until(WAIT, || !driver.is_connected()));
    let metrics = driver.metrics();
    assert_eq!(metrics.transport_faults, 1);
    assert!(metrics.cycles_failed >= 3);
    assert!(matches!(
        driver.wait_for_cycles(1, Duration::from_millis(50)),
        Err(DriverError::LinkDown)
    ));

    // 下一次请求重新连接
    driver.ensure_connected().unwrap();
    assert_eq!(mock.connects(), 2);
    driver.wait_for_cycles(2, WAIT).unwrap();
}

#[test]
fn test_garbage_responses_tolerated_below_threshold() {
    let mock = MockController::new();
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(fast_config())
        .connect()
        .unwrap();
    driver.wait_for_cycles(2, WAIT).unwrap();

    mock.garbage_responses(2);
    driver.wait_for_cycles(5, WAIT).unwrap();
    assert!(driver.is_connected());
    assert!(driver.metrics().codec_errors >= 1);
    assert_eq!(driver.metrics().transport_faults, 0);
}

#[test]
fn test_connect_fails_when_unplugged() {
    let mock = MockController::new();
    mock.unplug();
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(fast_config())
        .build()
        .unwrap();

    match driver.connect() {
        Err(DriverError::Connect(ConnectError::NotFound(patterns))) => {
            assert_eq!(patterns, "mock");
        },
        other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
    }
    assert_eq!(driver.link_state(), LinkState::Disconnected);

    mock.plug();
    driver.connect().unwrap();
    assert!(driver.is_connected());
}

#[test]
fn test_safety_interlock_clamps_output() {
    let mock = MockController::new();
    mock.set_input(7, true);
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(TransportConfig {
            safety_interlock: true,
            ..fast_config()
        })
        .connect()
        .unwrap();
    driver.wait_for_cycles(2, WAIT).unwrap();

    // I7 按下：M1 反向被阻止
    driver.context().set_duty(MotorId::M1, -512);
    driver.wait_for_cycles(3, WAIT).unwrap();
    assert_eq!(driver.context().duty(MotorId::M1), 0);
    assert!(driver.metrics().interlock_clamps >= 1);

    // 正向放行
    driver.context().set_duty(MotorId::M1, 512);
    driver.wait_for_cycles(3, WAIT).unwrap();
    assert_eq!(driver.context().duty(MotorId::M1), 512);
}

#[test]
fn test_disconnect_releases_session() {
    let mock = MockController::new();
    let registry = Arc::new(StaticRegistry::default());
    let driver = DriverBuilder::new()
        .connector(Arc::new(mock.connector()))
        .transport_config(fast_config())
        .registry(registry.clone())
        .connect()
        .unwrap();
    driver.wait_for_cycles(1, WAIT).unwrap();

    driver.disconnect();
    assert_eq!(driver.link_state(), LinkState::Disconnected);
    assert!(!registry.is_enabled());

    let exchanges = mock.exchanges();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(mock.exchanges(), exchanges);
}
