//! 帧构建与解析
//!
//! ```text
//! 0      2      4      8      12   14   16       20       24    26    28        28+n   30+n
//! +------+------+------+------+----+----+--------+--------+-----+-----+---------+------+----+
//! | 0255 | len  | from | to   |tid |sid | command| structs|ta_id| rsv | payload | csum | 03 |
//! +------+------+------+------+----+----+--------+--------+-----+-----+---------+------+----+
//! ```
//!
//! `len` 与 `csum` 为大端，其余字段为小端。

use crate::constants::*;
use crate::input::InputSnapshot;
use crate::output::OutputCommand;
use crate::{CodecError, read_u16_le, read_u32_le};
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 帧类型（命令码）
///
/// 响应命令码 = 请求命令码 + 100。
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum FrameKind {
    /// 周期数据交换（输出传输区 → 输入传输区）
    Exchange = 2,
    /// 配置/握手
    Configure = 5,
    /// 交换响应（0x66）
    ExchangeResponse = 102,
    /// 配置响应
    ConfigureResponse = 105,
}

impl FrameKind {
    /// 请求对应的响应类型
    pub fn response(self) -> Self {
        match self {
            Self::Exchange | Self::ExchangeResponse => Self::ExchangeResponse,
            Self::Configure | Self::ConfigureResponse => Self::ConfigureResponse,
        }
    }
}

/// 会话令牌（事务号 + 会话号）
///
/// 每个响应都携带令牌；下一帧请求使用 `tid + 1` 与原 `sid`。
/// 握手阶段协商出的令牌决定后续交换帧的顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionTokens {
    /// 下一帧使用的事务号
    pub tid: u16,
    /// 会话号
    pub sid: u16,
}

impl Default for SessionTokens {
    fn default() -> Self {
        Self { tid: 1, sid: 0 }
    }
}

impl SessionTokens {
    /// 由响应帧头推导下一帧令牌
    pub fn following(header: &FrameHeader) -> Self {
        Self {
            tid: header.tid.wrapping_add(1),
            sid: header.sid,
        }
    }

    /// 从原始响应字节提取令牌（只要求前 16 字节有效）
    ///
    /// 配置响应除令牌外不再解释。
    pub fn from_response(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < MIN_CONFIGURE_RESPONSE_LEN {
            return Err(CodecError::ShortFrame {
                expected: MIN_CONFIGURE_RESPONSE_LEN,
                actual: bytes.len(),
            });
        }
        check_start(bytes)?;
        Ok(Self {
            tid: read_u16_le(bytes, offsets::TID, "tid")?.wrapping_add(1),
            sid: read_u16_le(bytes, offsets::SID, "sid")?,
        })
    }
}

/// 解析后的帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// 长度字段（偏移 4 至负载末尾）
    pub length: u16,
    /// 源地址
    pub from: u32,
    /// 目标地址
    pub to: u32,
    /// 事务号
    pub tid: u16,
    /// 会话号
    pub sid: u16,
    /// 帧类型
    pub kind: FrameKind,
    /// 传输区结构数量
    pub struct_count: u32,
    /// 传输区 ID
    pub ta_id: u16,
}

impl FrameHeader {
    /// 整帧长度（含起始标记、长度字段与帧尾）
    pub fn frame_len(&self) -> usize {
        LENGTH_COVERAGE_START + usize::from(self.length) + TRAILER_LEN
    }

    /// 负载长度
    pub fn payload_len(&self) -> usize {
        usize::from(self.length).saturating_sub(HEADER_LEN - LENGTH_COVERAGE_START)
    }
}

/// 解析后的完整帧（借用接收缓冲区）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedFrame<'a> {
    pub header: FrameHeader,
    pub payload: &'a [u8],
    pub checksum: u16,
}

impl ParsedFrame<'_> {
    /// 校验和是否与内容一致
    ///
    /// 解码不会因校验和不一致而失败，调用方可自行决定是否检查。
    pub fn checksum_ok(&self, raw: &[u8]) -> bool {
        let end = offsets::PAYLOAD + self.payload.len();
        raw.get(offsets::LENGTH..end)
            .is_some_and(|covered| checksum(covered) == self.checksum)
    }
}

/// 计算校验和：对覆盖区域字节求和后取 16 位补码
pub fn checksum(covered: &[u8]) -> u16 {
    let sum = covered
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
    0u16.wrapping_sub(sum)
}

fn check_start(bytes: &[u8]) -> Result<(), CodecError> {
    if bytes.get(0..2) != Some(&FRAME_START[..]) {
        return Err(CodecError::MalformedField {
            field: "start",
            offset: 0,
        });
    }
    Ok(())
}

/// 构建一帧
///
/// 负载为空时传输区结构数量为 0。
pub fn build_frame(kind: FrameKind, tokens: SessionTokens, payload: &[u8]) -> Bytes {
    let total = HEADER_LEN + payload.len() + TRAILER_LEN;
    let length = (HEADER_LEN - LENGTH_COVERAGE_START + payload.len()) as u16;
    let struct_count = u32::from(!payload.is_empty());

    let mut buf = BytesMut::with_capacity(total);
    buf.put_slice(&FRAME_START);
    buf.put_u16(length);
    buf.put_u32_le(HOST_ADDRESS);
    buf.put_u32_le(CONTROLLER_ADDRESS);
    buf.put_u16_le(tokens.tid);
    buf.put_u16_le(tokens.sid);
    buf.put_u32_le(kind.into());
    buf.put_u32_le(struct_count);
    buf.put_u16_le(0); // 传输区 0：主控制器
    buf.put_u16_le(0);
    buf.put_slice(payload);

    let csum = checksum(&buf[offsets::LENGTH..]);
    buf.put_u16(csum);
    buf.put_u8(FRAME_END);
    buf.freeze()
}

/// 编码交换请求帧（75 字节）
pub fn encode(cmd: &OutputCommand, tokens: SessionTokens) -> Bytes {
    build_frame(FrameKind::Exchange, tokens, &cmd.encode_payload())
}

/// 编码配置/握手请求帧
pub fn encode_configure(tokens: SessionTokens) -> Bytes {
    build_frame(FrameKind::Configure, tokens, &[])
}

/// 编码交换响应帧（79 字节，模拟控制器与测试使用）
pub fn encode_response(snapshot: &InputSnapshot, tokens: SessionTokens) -> Bytes {
    build_frame(
        FrameKind::ExchangeResponse,
        tokens,
        &snapshot.encode_payload(),
    )
}

/// 解析帧头与负载
///
/// # 错误
/// - `ShortFrame`: 字节数不足帧头/帧尾，或少于长度字段声明的帧长
/// - `MalformedField`: 起始/结束标记、长度或命令码无法解释
pub fn parse_frame(bytes: &[u8]) -> Result<ParsedFrame<'_>, CodecError> {
    let min = HEADER_LEN + TRAILER_LEN;
    if bytes.len() < min {
        return Err(CodecError::ShortFrame {
            expected: min,
            actual: bytes.len(),
        });
    }
    check_start(bytes)?;

    let length = u16::from_be_bytes([bytes[offsets::LENGTH], bytes[offsets::LENGTH + 1]]);
    if usize::from(length) < HEADER_LEN - LENGTH_COVERAGE_START {
        return Err(CodecError::MalformedField {
            field: "length",
            offset: offsets::LENGTH,
        });
    }

    let command = read_u32_le(bytes, offsets::COMMAND, "command")?;
    let kind = FrameKind::try_from(command).map_err(|_| CodecError::MalformedField {
        field: "command",
        offset: offsets::COMMAND,
    })?;

    let header = FrameHeader {
        length,
        from: read_u32_le(bytes, offsets::FROM, "from")?,
        to: read_u32_le(bytes, offsets::TO, "to")?,
        tid: read_u16_le(bytes, offsets::TID, "tid")?,
        sid: read_u16_le(bytes, offsets::SID, "sid")?,
        kind,
        struct_count: read_u32_le(bytes, offsets::STRUCT_COUNT, "struct_count")?,
        ta_id: read_u16_le(bytes, offsets::TA_ID, "ta_id")?,
    };

    let frame_len = header.frame_len();
    if bytes.len() < frame_len {
        return Err(CodecError::ShortFrame {
            expected: frame_len,
            actual: bytes.len(),
        });
    }
    if bytes[frame_len - 1] != FRAME_END {
        return Err(CodecError::MalformedField {
            field: "end",
            offset: frame_len - 1,
        });
    }

    let payload_end = offsets::PAYLOAD + header.payload_len();
    let checksum = u16::from_be_bytes([bytes[payload_end], bytes[payload_end + 1]]);
    Ok(ParsedFrame {
        header,
        payload: &bytes[offsets::PAYLOAD..payload_end],
        checksum,
    })
}

/// 解码交换响应帧为输入快照
///
/// # 错误
/// - `ShortFrame`: 少于 63 字节
/// - `MalformedField`: 帧结构错误，或帧类型不是交换响应
pub fn decode(bytes: &[u8]) -> Result<InputSnapshot, CodecError> {
    if bytes.len() < MIN_EXCHANGE_RESPONSE_LEN {
        return Err(CodecError::ShortFrame {
            expected: MIN_EXCHANGE_RESPONSE_LEN,
            actual: bytes.len(),
        });
    }
    let frame = parse_frame(bytes)?;
    if frame.header.kind != FrameKind::ExchangeResponse {
        return Err(CodecError::MalformedField {
            field: "command",
            offset: offsets::COMMAND,
        });
    }
    InputSnapshot::decode_payload(frame.payload)
}
