//! 串口列表命令

use crate::config::CliConfig;
use anyhow::{Context, Result};
use clap::Args;

/// 列出本机串口，并标出匹配控制器描述的串口
#[derive(Args, Debug)]
pub struct PortsCommand {
    /// 只显示匹配的串口
    #[arg(short, long)]
    pub matching: bool,
}

impl PortsCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let ports = ftx_sdk::serial::list_ports().context("枚举串口失败")?;

        let mut shown = 0;
        for port in &ports {
            let matched =
                config.port.matches(&port.description) || config.port.matches(&port.port_name);
            if self.matching && !matched {
                continue;
            }
            let mark = if matched { "✅" } else { "  " };
            println!("{} {:<20} {}", mark, port.port_name, port.description);
            shown += 1;
        }

        if shown == 0 {
            println!("⚠️  未找到串口（匹配: {:?}）", config.port.name_patterns);
        }
        Ok(())
    }
}
