//! 测试用模拟机械臂

use super::motion::MotionIo;
use ftx_protocol::{INPUT_COUNT, InputId, MOTOR_COUNT, MotorId};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct RigState {
    duty: [i16; MOTOR_COUNT],
    max_abs_duty: [i16; MOTOR_COUNT],
    distance: [u16; MOTOR_COUNT],
    counters: [u16; MOTOR_COUNT],
    step: [u16; MOTOR_COUNT],
    resets: [u32; MOTOR_COUNT],
    counter_reads: [u32; MOTOR_COUNT],
    pressed: [bool; INPUT_COUNT],
    press_after: [Option<u32>; INPUT_COUNT],
}

/// 每次读取计数器时，占空比非零的电机前进 `step`
#[derive(Debug, Default)]
pub struct SimRig {
    state: Mutex<RigState>,
}

impl SimRig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_step(&self, motor: MotorId, step: u16) {
        self.state.lock().step[motor.index()] = step;
    }

    pub fn press(&self, input: InputId) {
        self.state.lock().pressed[input.index()] = true;
    }

    /// 再读取 `reads` 次后输入变为按下
    pub fn press_after(&self, input: InputId, reads: u32) {
        self.state.lock().press_after[input.index()] = Some(reads);
    }

    pub fn duty(&self, motor: MotorId) -> i16 {
        self.state.lock().duty[motor.index()]
    }

    pub fn max_abs_duty(&self, motor: MotorId) -> i16 {
        self.state.lock().max_abs_duty[motor.index()]
    }

    pub fn distance(&self, motor: MotorId) -> u16 {
        self.state.lock().distance[motor.index()]
    }

    pub fn counter(&self, motor: MotorId) -> u16 {
        self.state.lock().counters[motor.index()]
    }

    pub fn resets(&self, motor: MotorId) -> u32 {
        self.state.lock().resets[motor.index()]
    }

    pub fn counter_reads(&self, motor: MotorId) -> u32 {
        self.state.lock().counter_reads[motor.index()]
    }
}

impl MotionIo for SimRig {
    fn is_pressed(&self, input: InputId) -> bool {
        let mut state = self.state.lock();
        let i = input.index();
        if let Some(remaining) = state.press_after[i] {
            if remaining == 0 {
                state.pressed[i] = true;
                state.press_after[i] = None;
            } else {
                state.press_after[i] = Some(remaining - 1);
            }
        }
        state.pressed[i]
    }

    fn raw_counter(&self, motor: MotorId) -> u16 {
        let mut state = self.state.lock();
        let m = motor.index();
        state.counter_reads[m] += 1;
        if state.duty[m] != 0 {
            state.counters[m] = state.counters[m].wrapping_add(state.step[m]);
        }
        state.counters[m]
    }

    fn drive(&self, motor: MotorId, power: i16, distance: Option<u16>) {
        let mut state = self.state.lock();
        let m = motor.index();
        if let Some(distance) = distance {
            state.distance[m] = distance;
        }
        state.duty[m] = power;
        state.max_abs_duty[m] = state.max_abs_duty[m].max(power.abs());
    }

    fn reset_counter(&self, motor: MotorId) {
        let mut state = self.state.lock();
        let m = motor.index();
        state.resets[m] += 1;
        state.counters[m] = 0;
    }

    fn stop_motors(&self, motors: &[MotorId]) {
        let mut state = self.state.lock();
        for motor in motors {
            state.duty[motor.index()] = 0;
        }
    }
}
