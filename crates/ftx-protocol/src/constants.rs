//! 协议常量定义
//!
//! 帧尺寸与字段偏移是兼容性契约的一部分，必须与控制器固件保持一致。

/// 帧起始标记
pub const FRAME_START: [u8; 2] = [0x02, 0x55];

/// 帧结束标记
pub const FRAME_END: u8 = 0x03;

/// 主机地址（帧头 `from` 字段）
pub const HOST_ADDRESS: u32 = 2;

/// 控制器地址（帧头 `to` 字段）
pub const CONTROLLER_ADDRESS: u32 = 1;

/// 帧头长度（起始标记到传输区保留字段，含）
pub const HEADER_LEN: usize = 28;

/// 帧尾长度（2 字节校验和 + 结束标记）
pub const TRAILER_LEN: usize = 3;

/// 长度字段所覆盖区域在帧头中的起点
///
/// 长度字段 = 从偏移 4 到负载末尾的字节数。
pub const LENGTH_COVERAGE_START: usize = 4;

/// 帧头字段偏移
pub mod offsets {
    /// 长度字段（大端）
    pub const LENGTH: usize = 2;
    /// 源地址
    pub const FROM: usize = 4;
    /// 目标地址
    pub const TO: usize = 8;
    /// 事务号
    pub const TID: usize = 12;
    /// 会话号
    pub const SID: usize = 14;
    /// 命令码（帧类型）
    pub const COMMAND: usize = 16;
    /// 传输区结构数量
    pub const STRUCT_COUNT: usize = 20;
    /// 传输区 ID
    pub const TA_ID: usize = 24;
    /// 负载起点
    pub const PAYLOAD: usize = 28;
}

/// 交换请求负载长度（输出传输区）
///
/// `counter_reset[4]` u16 + `master[4]` u8 + `duty[8]` u16 + `distance[4]` u16 + `cmd_seq[4]` u16
pub const OUTPUT_PAYLOAD_LEN: usize = 44;

/// 输入传输区中被解释部分的长度
///
/// `digital_in[8]` u16 + `cnt_in[4]` u8 + `counter[4]` u16 + 两个显示按键 u16
pub const INPUT_INTERPRETED_LEN: usize = 32;

/// 控制器实际发送的保留字节数
pub const INPUT_RESERVED_WIRE_LEN: usize = 16;

/// 快照中保留区容量
pub const INPUT_RESERVED_LEN: usize = 20;

/// 交换响应负载长度（控制器实际发送）
pub const INPUT_PAYLOAD_LEN: usize = INPUT_INTERPRETED_LEN + INPUT_RESERVED_WIRE_LEN;

/// 交换请求帧总长度（75 字节）
pub const EXCHANGE_REQUEST_LEN: usize = HEADER_LEN + OUTPUT_PAYLOAD_LEN + TRAILER_LEN;

/// 交换响应帧总长度（79 字节）
pub const EXCHANGE_RESPONSE_LEN: usize = HEADER_LEN + INPUT_PAYLOAD_LEN + TRAILER_LEN;

/// 最小有效交换响应帧长度（63 字节）
pub const MIN_EXCHANGE_RESPONSE_LEN: usize = HEADER_LEN + INPUT_INTERPRETED_LEN + TRAILER_LEN;

/// 最小有效配置响应长度（令牌位于偏移 12..16）
pub const MIN_CONFIGURE_RESPONSE_LEN: usize = 16;

/// 设备复位哨兵值
///
/// 当 `digital_in[0]` 解码为该值时，控制器已静默复位，必须重新握手。
pub const DEVICE_RESET_SENTINEL: u16 = 0x983A;

/// 电机占空比最大幅值
pub const DUTY_MAX: i16 = 512;

/// 电机数量
pub const MOTOR_COUNT: usize = 4;

/// 数字输入数量
pub const INPUT_COUNT: usize = 8;

/// 接收缓冲区大小（大于任何合法响应）
pub const RX_BUFFER_LEN: usize = 200;
