//! 输出传输区（电机命令缓冲）
//!
//! `OutputCommand` 每个周期被编码进交换请求帧。控制器通过
//! `counter_reset` 与 `cmd_seq` 字段的递增来识别新命令。

use crate::constants::{DUTY_MAX, MOTOR_COUNT, OUTPUT_PAYLOAD_LEN};
use crate::{CodecError, read_u16_le};
use bytes::BufMut;
use std::fmt;

/// 电机编号（1-4）
///
/// 构造时校验范围，之后的数组索引不会越界。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorId(u8);

impl MotorId {
    pub const M1: Self = Self(1);
    pub const M2: Self = Self(2);
    pub const M3: Self = Self(3);
    pub const M4: Self = Self(4);

    /// 全部电机（按编号顺序）
    pub const ALL: [Self; MOTOR_COUNT] = [Self::M1, Self::M2, Self::M3, Self::M4];

    /// 从 1 起始的编号构造，超出范围返回 `None`
    pub fn new(number: u8) -> Option<Self> {
        (1..=MOTOR_COUNT as u8).contains(&number).then_some(Self(number))
    }

    /// 1 起始编号
    pub fn number(self) -> u8 {
        self.0
    }

    /// 0 起始数组索引
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// 输出传输区
///
/// # 不变量
///
/// 对每个电机 `m`：`duty[2m] * duty[2m + 1] == 0`，即正向/反向幅值至多一个非零。
/// 只能通过 [`set_duty`](Self::set_duty) 写入占空比以维持该不变量。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputCommand {
    /// 计数器复位序号（递增即请求控制器清零该电机的计数器）
    pub counter_reset: [u16; MOTOR_COUNT],
    /// 主从模式字节（本驱动始终为 0，原样透传）
    pub master: [u8; MOTOR_COUNT],
    /// 占空比：`2m` 为正向幅值，`2m + 1` 为反向幅值
    pub duty: [u16; MOTOR_COUNT * 2],
    /// 本次运动的目标计数值（仅供控制器参考）
    pub distance: [u16; MOTOR_COUNT],
    /// 命令序号：每次写入占空比或距离都递增
    pub cmd_seq: [u16; MOTOR_COUNT],
}

impl OutputCommand {
    /// 创建全零命令
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置电机有符号占空比
    ///
    /// 正值写入正向幅值、负值写入反向幅值，另一方清零；
    /// 超出 `[-512, 512]` 的值被钳位。
    pub fn set_duty(&mut self, motor: MotorId, power: i16) {
        let m = motor.index();
        self.cmd_seq[m] = self.cmd_seq[m].wrapping_add(1);

        let power = power.clamp(-DUTY_MAX, DUTY_MAX);
        if power > 0 {
            self.duty[m * 2] = power.unsigned_abs();
            self.duty[m * 2 + 1] = 0;
        } else {
            self.duty[m * 2] = 0;
            self.duty[m * 2 + 1] = power.unsigned_abs();
        }
    }

    /// 读取电机有符号占空比（`set_duty` 的逆运算）
    pub fn duty(&self, motor: MotorId) -> i16 {
        let m = motor.index();
        let forward = self.duty[m * 2];
        if forward != 0 {
            forward as i16
        } else {
            -(self.duty[m * 2 + 1] as i16)
        }
    }

    /// 停止电机（占空比置零）
    pub fn stop(&mut self, motor: MotorId) {
        self.set_duty(motor, 0);
    }

    /// 设置目标计数值
    pub fn set_distance(&mut self, motor: MotorId, distance: u16) {
        let m = motor.index();
        self.cmd_seq[m] = self.cmd_seq[m].wrapping_add(1);
        self.distance[m] = distance;
    }

    /// 请求控制器清零该电机的计数器
    pub fn reset_counter(&mut self, motor: MotorId) {
        let m = motor.index();
        self.counter_reset[m] = self.counter_reset[m].wrapping_add(1);
    }

    /// 编码为交换请求负载（44 字节，小端）
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(OUTPUT_PAYLOAD_LEN);
        for value in self.counter_reset {
            buf.put_u16_le(value);
        }
        buf.put_slice(&self.master);
        for value in self.duty {
            buf.put_u16_le(value);
        }
        for value in self.distance {
            buf.put_u16_le(value);
        }
        for value in self.cmd_seq {
            buf.put_u16_le(value);
        }
        buf
    }

    /// 从交换请求负载解码（模拟控制器与诊断使用）
    pub fn decode_payload(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() < OUTPUT_PAYLOAD_LEN {
            return Err(CodecError::ShortFrame {
                expected: OUTPUT_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }

        let mut cmd = Self::default();
        let mut offset = 0;
        for slot in cmd.counter_reset.iter_mut() {
            *slot = read_u16_le(payload, offset, "counter_reset")?;
            offset += 2;
        }
        for slot in cmd.master.iter_mut() {
            *slot = payload[offset];
            offset += 1;
        }
        for slot in cmd.duty.iter_mut() {
            *slot = read_u16_le(payload, offset, "duty")?;
            offset += 2;
        }
        for slot in cmd.distance.iter_mut() {
            *slot = read_u16_le(payload, offset, "distance")?;
            offset += 2;
        }
        for slot in cmd.cmd_seq.iter_mut() {
            *slot = read_u16_le(payload, offset, "cmd_seq")?;
            offset += 2;
        }
        Ok(cmd)
    }
}
