//! 自动化运行命令

use crate::config::CliConfig;
use crate::session::{open_dispatcher, shutdown_flag};
use anyhow::Result;
use clap::Args;
use ftx_sdk::Procedure;
use ftx_sdk::driver::ChannelEventHook;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// 运行自动化流程，Ctrl-C 停止
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 流程名称（reset、pickBoxUpAndMoveLeft）
    #[arg(short, long)]
    pub procedure: Option<String>,

    /// 先复位再运行（请求状态 2）
    #[arg(long)]
    pub reset: bool,

    /// 最长运行时间（秒）
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// 打印全部设备事件
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunCommand {
    /// 解析流程名称（在连接之前校验）
    fn selected_procedure(&self) -> Result<Option<Procedure>> {
        match &self.procedure {
            Some(name) => Ok(Some(name.parse()?)),
            None => Ok(None),
        }
    }

    fn requested_code(&self) -> &'static str {
        if self.reset { "2" } else { "1" }
    }

    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let selected = self.selected_procedure()?;
        let running = shutdown_flag()?;
        let dispatcher = open_dispatcher(config)?;

        let (hook, rx) = ChannelEventHook::new(256);
        dispatcher.driver().add_event_hook(Arc::new(hook));

        if let Some(procedure) = selected {
            dispatcher.set("AName", procedure.name())?;
        }
        dispatcher.set("AState", self.requested_code())?;
        println!("▶️  自动化已启动: {}", dispatcher.get("AName")?);
        println!("⏳ 按 Ctrl-C 停止");

        let deadline = self.duration.map(|s| Instant::now() + Duration::from_secs(s));
        while running.load(Ordering::SeqCst) && dispatcher.automation().is_running() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            if let Ok(event) = rx.recv_timeout(Duration::from_millis(200)) {
                if self.verbose || event.interface == "AState" {
                    println!("  {} {} = {}", event.device, event.interface, event.value);
                }
            }
        }

        if dispatcher.automation().is_running() {
            dispatcher.set("AState", "0")?;
            println!("⏹  自动化已停止");
        } else {
            println!("✅ 自动化已结束");
        }
        dispatcher.driver().disconnect();
        Ok(())
    }
}
