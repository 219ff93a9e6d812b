//! # FTX Protocol
//!
//! ROBO TX 控制器串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量定义（帧标记、长度、哨兵值）
//! - `frame`: 帧头、会话令牌、帧构建与解析
//! - `output`: 输出传输区（电机命令缓冲）
//! - `input`: 输入传输区（数字输入/计数器快照）
//!
//! ## 字节序
//!
//! 帧头中的长度字段与校验和使用大端字节序，
//! 其余多字节字段（传输区内容、地址、令牌）均为小端字节序，
//! 即文本表示中"高低字节互换"的形式。

pub mod constants;
pub mod frame;
pub mod input;
pub mod output;

// 重新导出常用类型
pub use constants::*;
pub use frame::*;
pub use input::*;
pub use output::*;

use thiserror::Error;

/// 编解码错误类型
///
/// 两种错误对传输循环都不是致命的：传输循环把它们视为"本周期交换失败"。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// 接收到的字节数少于最小有效帧长度
    #[error("Short frame: expected at least {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    /// 已知偏移处的字段无法解释
    #[error("Malformed field `{field}` at offset {offset}")]
    MalformedField { field: &'static str, offset: usize },
}

/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// 小端字节序转 u32
pub fn bytes_to_u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// 从切片的 `offset` 处读取小端 u16
///
/// 越界时返回 `MalformedField`，调用方传入字段名用于诊断。
pub fn read_u16_le(bytes: &[u8], offset: usize, field: &'static str) -> Result<u16, CodecError> {
    match bytes.get(offset..offset + 2) {
        Some(&[lo, hi]) => Ok(bytes_to_u16_le([lo, hi])),
        _ => Err(CodecError::MalformedField { field, offset }),
    }
}

/// 从切片的 `offset` 处读取小端 u32
pub fn read_u32_le(bytes: &[u8], offset: usize, field: &'static str) -> Result<u32, CodecError> {
    match bytes.get(offset..offset + 4) {
        Some(&[b0, b1, b2, b3]) => Ok(bytes_to_u32_le([b0, b1, b2, b3])),
        _ => Err(CodecError::MalformedField { field, offset }),
    }
}
