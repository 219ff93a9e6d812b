//! 一次性会话：按配置创建驱动与调度器

use crate::config::CliConfig;
use anyhow::{Context, Result};
use ftx_sdk::{CommandDispatcher, DriverBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 创建调度器（连接在第一次请求时建立）
pub fn open_dispatcher(config: &CliConfig) -> Result<CommandDispatcher> {
    let driver = DriverBuilder::new()
        .port_settings(config.port.clone())
        .transport_config(config.transport.clone())
        .build()
        .context("创建驱动失败")?;
    Ok(CommandDispatcher::new(
        Arc::new(driver),
        config.automation.clone(),
    ))
}

/// 安装 Ctrl-C 处理器，返回运行标志
pub fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("安装 Ctrl-C 处理器失败")?;
    Ok(running)
}
