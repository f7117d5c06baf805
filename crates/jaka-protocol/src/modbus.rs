//! Modbus-TCP 线圈协议编解码
//!
//! 只覆盖吸盘控制需要的两个功能码：
//! - `0x01` 读线圈
//! - `0x05` 写单个线圈
//!
//! # 帧格式
//!
//! ```text
//! | transaction id (2) | protocol id (2) = 0 | length (2) | unit id (1) | PDU ... |
//! ```
//!
//! 所有多字节字段均为大端字节序。`length` 计入 unit id 和 PDU。

use crate::ProtocolError;
use crate::action::{ActuatorState, CoilAddress};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Modbus-TCP 默认端口
pub const MODBUS_TCP_PORT: u16 = 502;
/// MBAP 报文头长度（含 unit id）
pub const MBAP_HEADER_LEN: usize = 7;
/// Modbus 协议标识（固定为 0）
pub const MODBUS_PROTOCOL_ID: u16 = 0;
/// 单个 PDU 的最大长度
pub const MAX_PDU_LEN: usize = 253;
/// 写线圈时 ON 的编码值
pub const COIL_ON: u16 = 0xFF00;
/// 写线圈时 OFF 的编码值
pub const COIL_OFF: u16 = 0x0000;
/// 异常响应标记位
const EXCEPTION_FLAG: u8 = 0x80;

/// 功能码
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    WriteSingleCoil = 0x05,
}

/// 异常码
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetFailed = 0x0B,
}

/// 异常码描述（未知异常码返回 "unknown exception"）
pub fn exception_description(code: u8) -> &'static str {
    match ExceptionCode::try_from(code) {
        Ok(ExceptionCode::IllegalFunction) => "illegal function",
        Ok(ExceptionCode::IllegalDataAddress) => "illegal data address",
        Ok(ExceptionCode::IllegalDataValue) => "illegal data value",
        Ok(ExceptionCode::ServerDeviceFailure) => "server device failure",
        Ok(ExceptionCode::Acknowledge) => "acknowledge",
        Ok(ExceptionCode::ServerDeviceBusy) => "server device busy",
        Ok(ExceptionCode::GatewayPathUnavailable) => "gateway path unavailable",
        Ok(ExceptionCode::GatewayTargetFailed) => "gateway target failed",
        Err(_) => "unknown exception",
    }
}

/// MBAP 报文头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// unit id + PDU 的字节数
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    /// 解析报文头
    ///
    /// 校验协议标识和长度范围，返回后调用方再读取 `pdu_len()` 字节的 PDU。
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < MBAP_HEADER_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: MBAP_HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let mut buf = &bytes[..MBAP_HEADER_LEN];
        let header = Self {
            transaction_id: buf.get_u16(),
            protocol_id: buf.get_u16(),
            length: buf.get_u16(),
            unit_id: buf.get_u8(),
        };

        if header.protocol_id != MODBUS_PROTOCOL_ID {
            return Err(ProtocolError::InvalidProtocolId(header.protocol_id));
        }
        // 至少要有功能码
        if header.length < 2 || header.length as usize > MAX_PDU_LEN + 1 {
            return Err(ProtocolError::InvalidValue {
                field: "length".to_string(),
                value: header.length,
            });
        }
        Ok(header)
    }

    /// PDU 长度
    pub fn pdu_len(&self) -> usize {
        self.length as usize - 1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.transaction_id);
        buf.put_u16(self.protocol_id);
        buf.put_u16(self.length);
        buf.put_u8(self.unit_id);
    }
}

/// 请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadCoils { address: CoilAddress, quantity: u16 },
    WriteSingleCoil { address: CoilAddress, state: ActuatorState },
}

impl ModbusRequest {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils { .. } => FunctionCode::ReadCoils,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
        }
    }

    /// 编码为完整的 ADU（MBAP + PDU）
    ///
    /// # Example
    ///
    /// ```
    /// use jaka_protocol::modbus::ModbusRequest;
    /// use jaka_protocol::{ActuatorState, CoilAddress};
    ///
    /// let req = ModbusRequest::WriteSingleCoil {
    ///     address: CoilAddress(8),
    ///     state: ActuatorState::On,
    /// };
    /// let adu = req.encode(1, 1);
    /// assert_eq!(&adu[..], &[0, 1, 0, 0, 0, 6, 1, 0x05, 0, 8, 0xFF, 0x00]);
    /// ```
    pub fn encode(&self, transaction_id: u16, unit_id: u8) -> Bytes {
        let mut pdu = BytesMut::with_capacity(5);
        pdu.put_u8(self.function_code().into());
        match *self {
            Self::ReadCoils { address, quantity } => {
                pdu.put_u16(address.value());
                pdu.put_u16(quantity);
            },
            Self::WriteSingleCoil { address, state } => {
                pdu.put_u16(address.value());
                pdu.put_u16(if state.is_on() { COIL_ON } else { COIL_OFF });
            },
        }

        let header = MbapHeader {
            transaction_id,
            protocol_id: MODBUS_PROTOCOL_ID,
            length: (pdu.len() + 1) as u16,
            unit_id,
        };
        let mut adu = BytesMut::with_capacity(MBAP_HEADER_LEN + pdu.len());
        header.encode(&mut adu);
        adu.extend_from_slice(&pdu);
        adu.freeze()
    }
}

/// 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    /// 读线圈响应，`status` 为按位打包的线圈状态（LSB 为起始地址）
    ReadCoils { status: Vec<u8> },
    /// 写单个线圈响应（设备回显请求）
    WriteSingleCoil { address: CoilAddress, state: ActuatorState },
}

impl ModbusResponse {
    /// 读取第 `index` 个线圈
    pub fn coil(&self, index: usize) -> Option<ActuatorState> {
        match self {
            Self::ReadCoils { status } => status
                .get(index / 8)
                .map(|byte| ActuatorState::from(byte & (1 << (index % 8)) != 0)),
            Self::WriteSingleCoil { .. } => None,
        }
    }

    /// 解析 PDU
    ///
    /// 异常响应（功能码最高位为 1）返回 [`ProtocolError::Exception`]。
    pub fn decode(pdu: &[u8], expected: FunctionCode) -> Result<Self, ProtocolError> {
        if pdu.is_empty() {
            return Err(ProtocolError::InvalidLength {
                expected: 1,
                actual: 0,
            });
        }
        let mut buf = pdu;
        let function = buf.get_u8();
        let expected_code: u8 = expected.into();

        if function == expected_code | EXCEPTION_FLAG {
            let code = if buf.has_remaining() { buf.get_u8() } else { 0 };
            return Err(ProtocolError::Exception {
                function: expected_code,
                code,
            });
        }
        if function != expected_code {
            return Err(ProtocolError::UnexpectedFunction {
                expected: expected_code,
                actual: function,
            });
        }

        match expected {
            FunctionCode::ReadCoils => {
                if !buf.has_remaining() {
                    return Err(ProtocolError::InvalidLength {
                        expected: 2,
                        actual: pdu.len(),
                    });
                }
                let byte_count = buf.get_u8() as usize;
                if buf.remaining() != byte_count {
                    return Err(ProtocolError::InvalidLength {
                        expected: byte_count + 2,
                        actual: pdu.len(),
                    });
                }
                Ok(Self::ReadCoils {
                    status: buf.to_vec(),
                })
            },
            FunctionCode::WriteSingleCoil => {
                if buf.remaining() != 4 {
                    return Err(ProtocolError::InvalidLength {
                        expected: 5,
                        actual: pdu.len(),
                    });
                }
                let address = CoilAddress(buf.get_u16());
                let state = match buf.get_u16() {
                    COIL_ON => ActuatorState::On,
                    COIL_OFF => ActuatorState::Off,
                    other => {
                        return Err(ProtocolError::InvalidValue {
                            field: "coil value".to_string(),
                            value: other,
                        });
                    },
                };
                Ok(Self::WriteSingleCoil { address, state })
            },
        }
    }
}
