//! # FTX CLI
//!
//! fischertechnik ROBO TX 夹爪机械臂命令行工具。
//!
//! ```bash
//! # 配置默认串口
//! ftx-cli config set --port-name /dev/ttyACM0
//!
//! # 单次读写（内部：连接 -> 请求 -> 断开）
//! ftx-cli get I3
//! ftx-cli set M1 -256
//!
//! # 运行自动化流程，Ctrl-C 停止
//! ftx-cli run --procedure pickBoxUpAndMoveLeft --reset
//!
//! # 监控设备事件
//! ftx-cli monitor --stats-interval 5
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

mod commands;
mod config;
mod session;

use commands::{
    ConfigCommand, GetCommand, MonitorCommand, PortsCommand, RunCommand, SetCommand, StopCommand,
};
use config::CliConfig;

/// FTX CLI - ROBO TX 命令行工具
#[derive(Parser, Debug)]
#[command(name = "ftx-cli")]
#[command(about = "Command-line interface for the ROBO TX gripper rig", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/ftx/ftx.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 串口路径，覆盖配置文件
    #[arg(long, global = true)]
    port: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 列出串口
    Ports {
        #[command(flatten)]
        args: PortsCommand,
    },

    /// 读取接口值
    Get {
        #[command(flatten)]
        args: GetCommand,
    },

    /// 写入接口值
    Set {
        #[command(flatten)]
        args: SetCommand,
    },

    /// 运行自动化流程
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 停止自动化与电机
    Stop {
        #[command(flatten)]
        args: StopCommand,
    },

    /// 监控设备事件
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },
}

impl Cli {
    fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config::default_path(),
        }
    }

    /// 加载配置并应用命令行覆盖
    fn load_config(&self) -> Result<CliConfig> {
        let mut config = CliConfig::load(&self.config_path()?)?;
        if let Some(port) = &self.port {
            config.port.port_name = Some(port.clone());
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    // 初始化日志
    let directive = "ftx_cli=info".parse::<Directive>()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();
    tracing::debug!("{:?}", cli);

    match &cli.command {
        Commands::Config(cmd) => cmd.execute(&cli.config_path()?),
        Commands::Ports { args } => args.execute(&cli.load_config()?),
        Commands::Get { args } => args.execute(&cli.load_config()?),
        Commands::Set { args } => args.execute(&cli.load_config()?),
        Commands::Run { args } => args.execute(&cli.load_config()?),
        Commands::Stop { args } => args.execute(&cli.load_config()?),
        Commands::Monitor { args } => args.execute(&cli.load_config()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ftx-cli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_get() {
        let cli = parse(&["get", "CC1"]);
        assert!(matches!(cli.command, Commands::Get { args } if args.interface == "CC1"));
    }

    #[test]
    fn test_parse_negative_duty() {
        let cli = parse(&["set", "M1", "-512"]);
        match cli.command {
            Commands::Set { args } => {
                assert_eq!(args.interface, "M1");
                assert_eq!(args.value, "-512");
                assert_eq!(args.hold_ms, 100);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_run() {
        let cli = parse(&["run", "--procedure", "reset", "--reset", "-d", "30"]);
        match cli.command {
            Commands::Run { args } => {
                assert_eq!(args.procedure.as_deref(), Some("reset"));
                assert!(args.reset);
                assert_eq!(args.duration, Some(30));
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_overrides() {
        let dir = std::env::temp_dir().join(format!("ftx-cli-main-{}", std::process::id()));
        let path = dir.join("ftx.toml");
        let cli = parse(&[
            "monitor",
            "--port",
            "/dev/ttyACM1",
            "--config",
            path.to_str().unwrap(),
        ]);

        assert_eq!(cli.config_path().unwrap(), path);
        let config = cli.load_config().unwrap();
        assert_eq!(config.port.port_name.as_deref(), Some("/dev/ttyACM1"));
    }

    #[test]
    fn test_parse_config_set() {
        let cli = parse(&[
            "config",
            "set",
            "--port-name",
            "COM4",
            "--safety-interlock",
            "true",
        ]);
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommand::Set {
                port_name: Some(_),
                safety_interlock: Some(true),
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["ftx-cli", "shell"]).is_err());
    }
}
