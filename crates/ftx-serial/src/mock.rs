//! 模拟控制器（仅用于测试）
//!
//! `MockController` 持有控制器的模拟状态，`MockConnector` 每次连接返回一个
//! 共享该状态的 `MockPort`。测试线程通过 `MockController` 的句柄改变输入、
//! 注入复位哨兵或丢弃响应，并观察驱动写出的命令。
//!
//! 行为：
//! - 配置帧：回复配置响应（令牌 = 请求 tid + 当前会话号）
//! - 交换帧：应用计数器复位，对占空比非零的电机按步长累加计数器，回复输入快照
//! - 未握手前的交换帧不回复

use crate::{Connector, SerialAdapter, SerialError};
use ftx_protocol::{
    DEVICE_RESET_SENTINEL, FrameKind, INPUT_COUNT, InputSnapshot, MOTOR_COUNT, OutputCommand,
    SessionTokens, build_frame, encode_response, parse_frame,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default)]
struct MockState {
    inputs: [bool; INPUT_COUNT],
    counters: [u16; MOTOR_COUNT],
    counter_step: [u16; MOTOR_COUNT],
    last_reset_seq: [u16; MOTOR_COUNT],
    session: u16,
    handshaken: bool,
    pending_sentinel: bool,
    drop_responses: u32,
    garbage_responses: u32,
    chunk_size: Option<usize>,
    unplugged: bool,
    connects: u32,
    handshakes: u32,
    exchanges: u32,
    last_command: OutputCommand,
    last_tokens: Option<SessionTokens>,
}

impl MockState {
    fn handle(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let parsed = match parse_frame(frame) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!("Mock controller ignored malformed request: {}", e);
                return None;
            },
        };
        let request_tokens = SessionTokens {
            tid: parsed.header.tid,
            sid: parsed.header.sid,
        };

        match parsed.header.kind {
            FrameKind::Configure => {
                self.handshakes += 1;
                self.handshaken = true;
                self.session = self.session.wrapping_add(1);
                let tokens = SessionTokens {
                    tid: request_tokens.tid,
                    sid: self.session,
                };
                Some(build_frame(FrameKind::ConfigureResponse, tokens, &[]).to_vec())
            },
            FrameKind::Exchange => {
                if !self.handshaken {
                    return None;
                }
                let cmd = OutputCommand::decode_payload(parsed.payload).ok()?;
                self.exchanges += 1;
                self.last_tokens = Some(request_tokens);
                self.apply(&cmd);
                self.last_command = cmd;

                if self.drop_responses > 0 {
                    self.drop_responses -= 1;
                    return None;
                }
                if self.garbage_responses > 0 {
                    self.garbage_responses -= 1;
                    return Some(vec![0x02, 0x55, 0x00, 0x10, 0xFF]);
                }

                let mut snapshot = self.snapshot();
                if self.pending_sentinel {
                    self.pending_sentinel = false;
                    // 控制器复位后需要重新握手
                    self.handshaken = false;
                    snapshot.digital_in[0] = DEVICE_RESET_SENTINEL;
                }
                Some(encode_response(&snapshot, request_tokens).to_vec())
            },
            _ => None,
        }
    }

    fn apply(&mut self, cmd: &OutputCommand) {
        for m in 0..MOTOR_COUNT {
            if cmd.counter_reset[m] != self.last_reset_seq[m] {
                self.last_reset_seq[m] = cmd.counter_reset[m];
                self.counters[m] = 0;
            }
            if cmd.duty[2 * m] != 0 || cmd.duty[2 * m + 1] != 0 {
                self.counters[m] = self.counters[m].wrapping_add(self.counter_step[m]);
            }
        }
    }

    fn snapshot(&self) -> InputSnapshot {
        let mut snapshot = InputSnapshot::default();
        for (slot, pressed) in snapshot.digital_in.iter_mut().zip(self.inputs) {
            *slot = u16::from(pressed);
        }
        snapshot.counter = self.counters;
        snapshot
    }
}

/// 模拟控制器句柄（可克隆，所有克隆共享同一状态）
#[derive(Debug, Clone, Default)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
}

impl MockController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建连接到本控制器的工厂
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            controller: self.clone(),
        }
    }

    /// 设置数字输入（1 起始编号）
    pub fn set_input(&self, number: usize, pressed: bool) {
        let mut state = self.state.lock();
        if let Some(slot) = number.checked_sub(1).and_then(|i| state.inputs.get_mut(i)) {
            *slot = pressed;
        }
    }

    /// 直接设置原始计数器值
    pub fn set_counter(&self, number: usize, value: u16) {
        let mut state = self.state.lock();
        if let Some(slot) = number.checked_sub(1).and_then(|i| state.counters.get_mut(i)) {
            *slot = value;
        }
    }

    /// 电机运行时每个交换周期的计数器步长（0 表示堵转）
    pub fn set_counter_step(&self, number: usize, step: u16) {
        let mut state = self.state.lock();
        if let Some(slot) = number.checked_sub(1).and_then(|i| state.counter_step.get_mut(i)) {
            *slot = step;
        }
    }

    /// 下一个交换响应携带复位哨兵，之后控制器要求重新握手
    pub fn inject_reset_sentinel(&self) {
        self.state.lock().pending_sentinel = true;
    }

    /// 接下来 `n` 个交换请求不回复
    pub fn drop_responses(&self, n: u32) {
        self.state.lock().drop_responses = n;
    }

    /// 接下来 `n` 个交换请求回复截断的垃圾帧
    pub fn garbage_responses(&self, n: u32) {
        self.state.lock().garbage_responses = n;
    }

    /// 把每个响应拆成最多 `size` 字节的片段逐次读出
    pub fn set_chunk_size(&self, size: Option<usize>) {
        self.state.lock().chunk_size = size.filter(|&s| s > 0);
    }

    /// 拔出：已打开的端口读写返回 `Disconnected`，新连接返回 `NotFound`
    pub fn unplug(&self) {
        self.state.lock().unplugged = true;
    }

    /// 插回
    pub fn plug(&self) {
        self.state.lock().unplugged = false;
    }

    pub fn inputs(&self) -> [bool; INPUT_COUNT] {
        self.state.lock().inputs
    }

    pub fn counters(&self) -> [u16; MOTOR_COUNT] {
        self.state.lock().counters
    }

    /// 最近一次交换请求中的输出命令
    pub fn last_command(&self) -> OutputCommand {
        self.state.lock().last_command.clone()
    }

    /// 最近一次交换请求携带的令牌
    pub fn last_tokens(&self) -> Option<SessionTokens> {
        self.state.lock().last_tokens
    }

    pub fn connects(&self) -> u32 {
        self.state.lock().connects
    }

    pub fn handshakes(&self) -> u32 {
        self.state.lock().handshakes
    }

    pub fn exchanges(&self) -> u32 {
        self.state.lock().exchanges
    }
}

/// 模拟串口
pub struct MockPort {
    state: Arc<Mutex<MockState>>,
    rx: VecDeque<Vec<u8>>,
}

impl SerialAdapter for MockPort {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), SerialError> {
        let mut state = self.state.lock();
        if state.unplugged {
            return Err(SerialError::Disconnected);
        }
        if let Some(response) = state.handle(frame) {
            match state.chunk_size {
                Some(size) => self.rx.extend(response.chunks(size).map(<[u8]>::to_vec)),
                None => self.rx.push_back(response),
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        if self.state.lock().unplugged {
            return Err(SerialError::Disconnected);
        }
        let Some(mut chunk) = self.rx.pop_front() else {
            return Err(SerialError::Timeout);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunk.drain(..n);
            self.rx.push_front(chunk);
        }
        Ok(n)
    }

    fn port_name(&self) -> &str {
        "mock"
    }

    fn discard_input(&mut self) -> Result<(), SerialError> {
        self.rx.clear();
        Ok(())
    }
}

/// 模拟串口工厂
#[derive(Debug, Clone)]
pub struct MockConnector {
    controller: MockController,
}

impl Connector for MockConnector {
    fn connect(&self) -> Result<Box<dyn SerialAdapter + Send>, SerialError> {
        let mut state = self.controller.state.lock();
        if state.unplugged {
            return Err(SerialError::NotFound {
                patterns: vec!["mock".to_string()],
            });
        }
        state.connects += 1;
        // 新打开的端口需要重新握手
        state.handshaken = false;
        Ok(Box::new(MockPort {
            state: Arc::clone(&self.controller.state),
            rx: VecDeque::new(),
        }))
    }

    fn describe(&self) -> String {
        "mock controller".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftx_protocol::{MotorId, SessionTokens, decode, encode, encode_configure};

    fn read_all(port: &mut dyn SerialAdapter) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 200];
        while let Ok(n) = port.read(&mut buf) {
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    fn open(controller: &MockController) -> Box<dyn SerialAdapter + Send> {
        controller.connector().connect().unwrap()
    }

    #[test]
    fn test_exchange_requires_handshake() {
        let controller = MockController::new();
        let mut port = open(&controller);

        port.write_frame(&encode(&OutputCommand::new(), SessionTokens::default()))
            .unwrap();
        assert!(matches!(port.read(&mut [0u8; 200]), Err(SerialError::Timeout)));

        port.write_frame(&encode_configure(SessionTokens::default())).unwrap();
        let response = read_all(port.as_mut());
        let tokens = SessionTokens::from_response(&response).unwrap();
        assert_eq!(tokens, SessionTokens { tid: 2, sid: 1 });
        assert_eq!(controller.handshakes(), 1);
    }

    #[test]
    fn test_counter_steps_and_reset() {
        let controller = MockController::new();
        let mut port = open(&controller);
        port.write_frame(&encode_configure(SessionTokens::default())).unwrap();
        let tokens = SessionTokens::from_response(&read_all(port.as_mut())).unwrap();

        controller.set_counter_step(3, 5);
        let mut cmd = OutputCommand::new();
        cmd.set_duty(MotorId::M3, 512);
        port.write_frame(&encode(&cmd, tokens)).unwrap();
        port.write_frame(&encode(&cmd, tokens)).unwrap();
        let bytes = read_all(port.as_mut());
        let second = decode(&bytes[79..]).unwrap();
        assert_eq!(second.counter(MotorId::M3), 10);

        cmd.reset_counter(MotorId::M3);
        cmd.stop(MotorId::M3);
        port.write_frame(&encode(&cmd, tokens)).unwrap();
        let snapshot = decode(&read_all(port.as_mut())).unwrap();
        assert_eq!(snapshot.counter(MotorId::M3), 0);
    }

    #[test]
    fn test_sentinel_is_one_shot() {
        let controller = MockController::new();
        let mut port = open(&controller);
        port.write_frame(&encode_configure(SessionTokens::default())).unwrap();
        let tokens = SessionTokens::from_response(&read_all(port.as_mut())).unwrap();

        controller.inject_reset_sentinel();
        port.write_frame(&encode(&OutputCommand::new(), tokens)).unwrap();
        let snapshot = decode(&read_all(port.as_mut())).unwrap();
        assert!(snapshot.is_reset_sentinel());

        // 复位后未握手：不再回复
        port.write_frame(&encode(&OutputCommand::new(), tokens)).unwrap();
        assert!(read_all(port.as_mut()).is_empty());
    }

    #[test]
    fn test_chunked_reads() {
        let controller = MockController::new();
        controller.set_chunk_size(Some(10));
        let mut port = open(&controller);
        port.write_frame(&encode_configure(SessionTokens::default())).unwrap();

        let mut buf = [0u8; 200];
        assert_eq!(port.read(&mut buf).unwrap(), 10);
        assert_eq!(read_all(port.as_mut()).len(), 31 - 10);
    }

    #[test]
    fn test_unplugged() {
        let controller = MockController::new();
        let connector = controller.connector();
        controller.unplug();
        assert!(matches!(
            connector.connect(),
            Err(SerialError::NotFound { .. })
        ));
        controller.plug();
        assert!(connector.connect().is_ok());
        assert_eq!(controller.connects(), 1);
    }
}
