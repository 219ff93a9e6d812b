//! Builder 模式实现
//!
//! 提供链式构造 `Driver` 实例的便捷方式。

use crate::driver::Driver;
use crate::error::DriverError;
use crate::hooks::{EventHook, LinkHook};
use crate::pipeline::TransportConfig;
use crate::registry::{DeviceRegistry, StaticRegistry};
use ftx_serial::{Connector, PortSettings};
use std::sync::Arc;

/// Driver Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use ftx_driver::{DriverBuilder, TransportConfig};
///
/// let driver = DriverBuilder::new()
///     .transport_config(TransportConfig {
///         max_read_retries: 3,
///         ..Default::default()
///     })
///     .connect()
///     .unwrap();
/// ```
pub struct DriverBuilder {
    /// 自定义串口工厂（测试时注入模拟控制器）
    connector: Option<Arc<dyn Connector>>,
    /// 串口参数（未指定工厂时用于本机后端）
    port_settings: PortSettings,
    config: TransportConfig,
    registry: Option<Arc<dyn DeviceRegistry>>,
    event_hooks: Vec<Arc<dyn EventHook>>,
    link_hooks: Vec<Arc<dyn LinkHook>>,
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverBuilder {
    pub fn new() -> Self {
        Self {
            connector: None,
            port_settings: PortSettings::default(),
            config: TransportConfig::default(),
            registry: None,
            event_hooks: Vec::new(),
            link_hooks: Vec::new(),
        }
    }

    /// 使用自定义串口工厂
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 设置串口参数（可选，默认 115200 波特率、按名称发现）
    pub fn port_settings(mut self, settings: PortSettings) -> Self {
        self.port_settings = settings;
        self
    }

    /// 直接指定串口路径，跳过发现
    pub fn port_name(mut self, name: impl Into<String>) -> Self {
        self.port_settings.port_name = Some(name.into());
        self
    }

    /// 设置传输循环配置（可选）
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置设备注册表（可选，默认 `StaticRegistry`）
    pub fn registry(mut self, registry: Arc<dyn DeviceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn event_hook(mut self, hook: Arc<dyn EventHook>) -> Self {
        self.event_hooks.push(hook);
        self
    }

    pub fn link_hook(mut self, hook: Arc<dyn LinkHook>) -> Self {
        self.link_hooks.push(hook);
        self
    }

    fn resolve_connector(&mut self) -> Result<Arc<dyn Connector>, DriverError> {
        if let Some(connector) = self.connector.take() {
            return Ok(connector);
        }

        #[cfg(feature = "native")]
        {
            Ok(Arc::new(ftx_serial::SerialPortConnector::new(
                self.port_settings.clone(),
            )))
        }

        #[cfg(not(feature = "native"))]
        {
            Err(crate::error::ConnectError::PortError(ftx_serial::SerialError::Port(
                "no serial backend enabled (enable the `native` feature or supply a connector)"
                    .to_string(),
            ))
            .into())
        }
    }

    /// 构造驱动（不连接）
    pub fn build(mut self) -> Result<Driver, DriverError> {
        let connector = self.resolve_connector()?;
        let registry = self
            .registry
            .take()
            .unwrap_or_else(|| Arc::new(StaticRegistry::default()));

        let driver = Driver::new(connector, self.config, registry);
        for hook in self.event_hooks {
            driver.add_event_hook(hook);
        }
        for hook in self.link_hooks {
            driver.add_link_hook(hook);
        }
        Ok(driver)
    }

    /// 构造驱动并立即连接
    pub fn connect(self) -> Result<Driver, DriverError> {
        let driver = self.build()?;
        driver.connect()?;
        Ok(driver)
    }
}
