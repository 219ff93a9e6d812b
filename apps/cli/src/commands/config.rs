//! 配置管理命令

use crate::config::CliConfig;
use anyhow::Result;
use clap::Subcommand;
use std::path::Path;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 串口路径（如 /dev/ttyACM0、COM4）
        #[arg(long)]
        port_name: Option<String>,

        /// 波特率
        #[arg(short, long)]
        baud_rate: Option<u32>,

        /// 启动时启用安全联锁
        #[arg(long)]
        safety_interlock: Option<bool>,

        /// 计数轮询间隔（毫秒）
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },

    /// 显示当前配置
    Show,

    /// 显示配置文件路径
    Path,

    /// 恢复默认配置
    Reset,
}

impl ConfigCommand {
    pub fn execute(&self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Set {
                port_name,
                baud_rate,
                safety_interlock,
                poll_interval_ms,
            } => {
                let mut config = CliConfig::load(path)?;
                let changed = apply_set(
                    &mut config,
                    port_name.clone(),
                    *baud_rate,
                    *safety_interlock,
                    *poll_interval_ms,
                );
                if changed.is_empty() {
                    println!("⚠️  没有指定任何配置项");
                    return Ok(());
                }
                config.save(path)?;
                for line in changed {
                    println!("✅ {}", line);
                }
                Ok(())
            },

            ConfigCommand::Show => {
                let config = CliConfig::load(path)?;
                println!("# {}", path.display());
                print!("{}", config.to_toml()?);
                Ok(())
            },

            ConfigCommand::Path => {
                println!("{}", path.display());
                Ok(())
            },

            ConfigCommand::Reset => {
                CliConfig::default().save(path)?;
                println!("✅ 已恢复默认配置: {}", path.display());
                Ok(())
            },
        }
    }
}

/// 应用 `config set` 的参数，返回变更描述
fn apply_set(
    config: &mut CliConfig,
    port: Option<String>,
    baud_rate: Option<u32>,
    safety_interlock: Option<bool>,
    poll_interval_ms: Option<u64>,
) -> Vec<String> {
    let mut changed = Vec::new();

    if let Some(port) = port {
        changed.push(format!("设置串口: {}", port));
        config.port.port_name = Some(port);
    }
    if let Some(baud) = baud_rate {
        config.port.baud_rate = baud;
        changed.push(format!("设置波特率: {}", baud));
    }
    if let Some(enabled) = safety_interlock {
        config.transport.safety_interlock = enabled;
        changed.push(format!("设置安全联锁: {}", enabled));
    }
    if let Some(ms) = poll_interval_ms {
        config.automation.poll_interval_ms = ms;
        changed.push(format!("设置轮询间隔: {}ms", ms));
    }

    changed
}
