//! 命名流程

use super::motion::{MotionRunner, Move};
use crate::channel::{Channel, Direction};
use crate::error::AutomationError;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use Channel::{ArmRotation, ArmVertical, Gripper};
use Direction::{Ccw, Close, Cw, Down, Open, Up};

/// 可选流程
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Procedure {
    /// 三个通道依次回零
    Reset,
    /// 回零后循环搬运：左侧夹起，右侧放下，再搬回
    #[default]
    PickBoxUpAndMoveLeft,
}

impl Procedure {
    pub const ALL: [Self; 2] = [Self::Reset, Self::PickBoxUpAndMoveLeft];

    pub fn name(self) -> &'static str {
        match self {
            Procedure::Reset => "reset",
            Procedure::PickBoxUpAndMoveLeft => "pickBoxUpAndMoveLeft",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Procedure {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| AutomationError::UnknownProcedure(s.to_string()))
    }
}

/// 搬运循环的计数移动序列
pub const PICK_BOX_UP_AND_MOVE_LEFT: [Move; 13] = [
    Move::new(ArmVertical, Down, 1240),
    Move::new(Gripper, Close, 10),
    Move::new(ArmVertical, Up, 700),
    Move::new(ArmRotation, Ccw, 800),
    Move::new(ArmVertical, Down, 700),
    Move::new(Gripper, Open, 9),
    Move::new(ArmVertical, Up, 1230),
    // 搬回
    Move::new(ArmVertical, Down, 1230),
    Move::new(Gripper, Close, 9),
    Move::new(ArmVertical, Up, 700),
    Move::new(ArmRotation, Cw, 797),
    Move::new(ArmVertical, Down, 700),
    Move::new(Gripper, Open, 10),
];

/// 回零：垂直、旋转、夹爪
///
/// 单个通道超时只记录，继续下一个通道。
pub fn reset(runner: &MotionRunner<'_>) -> Result<(), AutomationError> {
    for channel in Channel::ALL {
        runner.tolerate(runner.home(channel))?;
    }
    Ok(())
}

/// 循环执行回零 + 搬运序列，直到取消
pub fn pick_box_up_and_move_left(runner: &MotionRunner<'_>) -> Result<(), AutomationError> {
    let mut iteration: u64 = 0;
    loop {
        runner.cancel_token().check()?;
        iteration += 1;
        debug!("pickBoxUpAndMoveLeft iteration {}", iteration);

        reset(runner)?;
        for step in &PICK_BOX_UP_AND_MOVE_LEFT {
            runner.tolerate(runner.counted_move(step))?;
        }
    }
}

/// 执行指定流程
pub fn run(procedure: Procedure, runner: &MotionRunner<'_>) -> Result<(), AutomationError> {
    info!("Running automation procedure {}", procedure);
    match procedure {
        Procedure::Reset => reset(runner),
        Procedure::PickBoxUpAndMoveLeft => pick_box_up_and_move_left(runner),
    }
}
