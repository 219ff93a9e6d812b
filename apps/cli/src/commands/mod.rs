//! 命令模块

pub mod config;
pub mod io;
pub mod monitor;
pub mod ports;
pub mod run;
pub mod stop;

pub use config::ConfigCommand;
pub use io::{GetCommand, SetCommand};
pub use monitor::MonitorCommand;
pub use ports::PortsCommand;
pub use run::RunCommand;
pub use stop::StopCommand;
