//! 单次读写命令
//!
//! 与调度器的请求语法一致：`M1..M4`、`I1..I8`、`CC1..CC4`、`AState`、`AName`、`S1`。

use crate::config::CliConfig;
use crate::session::open_dispatcher;
use anyhow::Result;
use clap::Args;

/// 读取接口值
#[derive(Args, Debug)]
pub struct GetCommand {
    /// 接口名（如 I3、CC1、M2、AState）
    pub interface: String,
}

impl GetCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let dispatcher = open_dispatcher(config)?;
        let value = dispatcher.get(&self.interface)?;
        println!("{} = {}", self.interface, value);
        dispatcher.driver().disconnect();
        Ok(())
    }
}

/// 写入接口值
#[derive(Args, Debug)]
pub struct SetCommand {
    /// 接口名（如 M1、AName、S1）
    pub interface: String,

    /// 新值
    #[arg(allow_hyphen_values = true)]
    pub value: String,

    /// 写入后保持连接的时间（毫秒），让输出至少送达一个周期
    #[arg(long, default_value_t = 100)]
    pub hold_ms: u64,
}

impl SetCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let dispatcher = open_dispatcher(config)?;
        let value = dispatcher.set(&self.interface, &self.value)?;
        println!("✅ {} = {}", self.interface, value);
        std::thread::sleep(std::time::Duration::from_millis(self.hold_ms));
        dispatcher.driver().disconnect();
        Ok(())
    }
}
