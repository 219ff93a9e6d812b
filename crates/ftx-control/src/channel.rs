//! 机械臂通道与方向
//!
//! | 通道 | 电机 | 限位输入 | 正向 (+512) | 反向 (-512) | 回零方向 |
//! |---|---|---|---|---|---|
//! | ArmRotation | M1 | I1 | CCW | CW | CW |
//! | ArmVertical | M3 | I3 | Down | Up | Up |
//! | Gripper | M4 | I4 | Open | Close | Open |
//!
//! M2 不属于任何流程，但可以通过调度器直接读写。

use ftx_protocol::{DUTY_MAX, InputId, MotorId};
use std::fmt;

/// 流程使用的电机通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    ArmRotation,
    ArmVertical,
    Gripper,
}

/// 逻辑方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Cw,
    Ccw,
    Up,
    Down,
    Close,
    Open,
}

impl Direction {
    /// 有符号占空比
    pub fn duty(self) -> i16 {
        match self {
            Direction::Ccw | Direction::Down | Direction::Open => DUTY_MAX,
            Direction::Cw | Direction::Up | Direction::Close => -DUTY_MAX,
        }
    }
}

impl Channel {
    /// 流程使用的全部通道（回零顺序）
    pub const ALL: [Self; 3] = [Self::ArmVertical, Self::ArmRotation, Self::Gripper];

    /// 停止流程时需要清零的电机
    pub const MOTORS: [MotorId; 3] = [MotorId::M1, MotorId::M3, MotorId::M4];

    pub fn motor(self) -> MotorId {
        match self {
            Channel::ArmRotation => MotorId::M1,
            Channel::ArmVertical => MotorId::M3,
            Channel::Gripper => MotorId::M4,
        }
    }

    /// 同编号的限位输入
    pub fn limit_input(self) -> InputId {
        InputId::limit_of(self.motor())
    }

    pub fn home_direction(self) -> Direction {
        match self {
            Channel::ArmRotation => Direction::Cw,
            Channel::ArmVertical => Direction::Up,
            Channel::Gripper => Direction::Open,
        }
    }

    /// 堵转计数超过该值即判定卡住
    ///
    /// 夹爪计数器分辨率低、转得慢，阈值更紧。
    pub fn stall_limit(self) -> u32 {
        match self {
            Channel::Gripper => 5,
            Channel::ArmRotation | Channel::ArmVertical => 10,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::ArmRotation => "ArmRotation",
            Channel::ArmVertical => "ArmVertical",
            Channel::Gripper => "Gripper",
        };
        write!(f, "{}({})", name, self.motor())
    }
}
