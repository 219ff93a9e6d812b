//! 停止命令

use crate::config::CliConfig;
use crate::session::open_dispatcher;
use anyhow::Result;
use clap::Args;
use ftx_sdk::MotorId;
use std::time::Duration;

/// 停止自动化并把全部电机占空比置零
#[derive(Args, Debug)]
pub struct StopCommand {
    /// 跳过停止自动化
    #[arg(long)]
    pub motors_only: bool,
}

impl StopCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let dispatcher = open_dispatcher(config)?;
        if !self.motors_only {
            dispatcher.set("AState", "0")?;
        }
        for motor in MotorId::ALL {
            dispatcher.set(&motor.to_string(), "0")?;
        }
        // 至少送出一帧停止命令
        dispatcher
            .driver()
            .wait_for_cycles(2, Duration::from_secs(1))?;
        println!("🛑 电机已停止");
        dispatcher.driver().disconnect();
        Ok(())
    }
}
