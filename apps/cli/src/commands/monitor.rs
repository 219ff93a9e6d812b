//! 事件监控命令

use crate::config::CliConfig;
use crate::session::{open_dispatcher, shutdown_flag};
use anyhow::{Context, Result};
use clap::Args;
use ftx_sdk::InputId;
use ftx_sdk::driver::ChannelEventHook;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// 打印输入、计数器与自动化事件，Ctrl-C 退出
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 打印驱动统计的间隔（秒，0 表示不打印）
    #[arg(short, long, default_value_t = 0)]
    pub stats_interval: u64,
}

impl MonitorCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let running = shutdown_flag()?;
        let dispatcher = open_dispatcher(config)?;
        let driver = dispatcher.driver();

        let (hook, rx) = ChannelEventHook::new(1024);
        let dropped = hook.dropped_counter();
        driver.add_event_hook(Arc::new(hook));
        driver.ensure_connected().context("连接控制器失败")?;

        let snapshot = driver.snapshot();
        let pressed: Vec<String> = InputId::all()
            .filter(|&input| snapshot.is_pressed(input))
            .map(|input| input.to_string())
            .collect();
        println!("🔌 已连接，按下的输入: {:?}", pressed);
        println!("⏳ 按 Ctrl-C 退出");

        let stats_interval = Duration::from_secs(self.stats_interval);
        let mut last_stats = Instant::now();
        while running.load(Ordering::SeqCst) {
            if let Ok(event) = rx.recv_timeout(Duration::from_millis(200)) {
                println!("{} {} = {}", event.device, event.interface, event.value);
            }
            if self.stats_interval > 0 && last_stats.elapsed() >= stats_interval {
                last_stats = Instant::now();
                print_stats(&dispatcher.driver().metrics(), dropped.load(Ordering::Relaxed));
            }
            if !driver.is_connected() {
                println!("⚠️  链路断开，重新连接...");
                if let Err(e) = driver.ensure_connected() {
                    println!("❌ 重新连接失败: {}", e);
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }

        print_stats(&driver.metrics(), dropped.load(Ordering::Relaxed));
        driver.disconnect();
        Ok(())
    }
}

fn print_stats(metrics: &ftx_sdk::driver::MetricsSnapshot, dropped: u64) {
    println!(
        "📊 周期 {} (失败 {}) | 握手 {} | 复位 {} | 故障 {} | 事件 {} (丢弃 {})",
        metrics.cycles_total,
        metrics.cycles_failed,
        metrics.handshakes,
        metrics.device_resets,
        metrics.transport_faults,
        metrics.events_emitted,
        dropped,
    );
}
