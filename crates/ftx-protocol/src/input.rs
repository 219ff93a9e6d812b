//! 输入传输区（数字输入/计数器快照）

use crate::constants::{
    DEVICE_RESET_SENTINEL, INPUT_COUNT, INPUT_INTERPRETED_LEN, INPUT_RESERVED_LEN,
    INPUT_RESERVED_WIRE_LEN, MOTOR_COUNT,
};
use crate::output::MotorId;
use crate::{CodecError, read_u16_le};
use bytes::BufMut;
use std::fmt;

/// 数字输入编号（1-8）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputId(u8);

impl InputId {
    /// 从 1 起始的编号构造，超出范围返回 `None`
    pub fn new(number: u8) -> Option<Self> {
        (1..=INPUT_COUNT as u8).contains(&number).then_some(Self(number))
    }

    /// 与电机同编号的限位输入（限位开关接在同号通道上）
    pub fn limit_of(motor: MotorId) -> Self {
        Self(motor.number())
    }

    /// 1 起始编号
    pub fn number(self) -> u8 {
        self.0
    }

    /// 0 起始数组索引
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// 全部输入（按编号顺序）
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=INPUT_COUNT as u8).map(Self)
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// 输入传输区快照
///
/// 由传输循环每周期解码并整体发布，发布后不可变。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputSnapshot {
    /// 数字输入（非零即按下）
    pub digital_in: [u16; INPUT_COUNT],
    /// 快速计数输入（原始 u8）
    pub cnt_in: [u8; MOTOR_COUNT],
    /// 硬件计数器（16 位，与电机 1-4 同通道）
    pub counter: [u16; MOTOR_COUNT],
    /// 显示屏左键
    pub display_button_left: u16,
    /// 显示屏右键
    pub display_button_right: u16,
    /// 保留区（不解释，原样透传）
    pub reserved: [u8; INPUT_RESERVED_LEN],
}

impl InputSnapshot {
    /// 输入是否按下
    pub fn is_pressed(&self, input: InputId) -> bool {
        self.digital_in[input.index()] != 0
    }

    /// 读取电机同通道的原始计数器
    pub fn counter(&self, motor: MotorId) -> u16 {
        self.counter[motor.index()]
    }

    /// 是否为设备复位哨兵
    pub fn is_reset_sentinel(&self) -> bool {
        self.digital_in[0] == DEVICE_RESET_SENTINEL
    }

    /// 从交换响应负载解码
    ///
    /// 负载至少包含 32 字节被解释的字段；之后最多 20 字节复制进保留区，
    /// 不足部分补零。
    pub fn decode_payload(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() < INPUT_INTERPRETED_LEN {
            return Err(CodecError::ShortFrame {
                expected: INPUT_INTERPRETED_LEN,
                actual: payload.len(),
            });
        }

        let mut snapshot = Self::default();
        let mut offset = 0;
        for slot in snapshot.digital_in.iter_mut() {
            *slot = read_u16_le(payload, offset, "digital_in")?;
            offset += 2;
        }
        // cnt_in 是 u8 数组，无需字节交换
        snapshot.cnt_in.copy_from_slice(&payload[offset..offset + MOTOR_COUNT]);
        offset += MOTOR_COUNT;
        for slot in snapshot.counter.iter_mut() {
            *slot = read_u16_le(payload, offset, "counter")?;
            offset += 2;
        }
        snapshot.display_button_left = read_u16_le(payload, offset, "display_button_left")?;
        snapshot.display_button_right = read_u16_le(payload, offset + 2, "display_button_right")?;
        offset += 4;

        let reserved = &payload[offset..];
        let n = reserved.len().min(INPUT_RESERVED_LEN);
        snapshot.reserved[..n].copy_from_slice(&reserved[..n]);

        Ok(snapshot)
    }

    /// 编码为交换响应负载（48 字节，与控制器发送格式一致）
    ///
    /// 仅写出线上存在的 16 个保留字节。
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(INPUT_INTERPRETED_LEN + INPUT_RESERVED_WIRE_LEN);
        for value in self.digital_in {
            buf.put_u16_le(value);
        }
        buf.put_slice(&self.cnt_in);
        for value in self.counter {
            buf.put_u16_le(value);
        }
        buf.put_u16_le(self.display_button_left);
        buf.put_u16_le(self.display_button_right);
        buf.put_slice(&self.reserved[..INPUT_RESERVED_WIRE_LEN]);
        buf
    }
}
