//! CLI 配置文件
//!
//! 默认位置 `<config_dir>/ftx/ftx.toml`，缺失的字段使用默认值：
//!
//! ```toml
//! [port]
//! port_name = "/dev/ttyACM0"
//!
//! [transport]
//! safety_interlock = true
//!
//! [automation]
//! poll_interval_ms = 150
//! ```

use anyhow::{Context, Result};
use ftx_sdk::{AutomationTiming, PortSettings, TransportConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件路径
pub fn default_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("ftx");
    path.push("ftx.toml");
    Ok(path)
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// 串口参数
    pub port: PortSettings,
    /// 传输循环参数
    pub transport: TransportConfig,
    /// 自动化时序
    pub automation: AutomationTiming,
}

impl CliConfig {
    /// 从文件加载；文件不存在时返回默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 保存配置（自动创建目录）
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        fs::write(path, self.to_toml()?).context("写入配置文件失败")?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
