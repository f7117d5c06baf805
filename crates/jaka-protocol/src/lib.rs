//! # Jaka Protocol
//!
//! 遥操作数据类型与线圈协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `pose`: 笛卡尔位姿、位姿增量、关节位置
//! - `action`: 每个控制周期的动作记录、执行器状态、运动模式
//! - `modbus`: Modbus-TCP 线圈读写编解码
//!
//! ## 字节序
//!
//! Modbus 协议使用大端字节序。

pub mod action;
pub mod modbus;
pub mod pose;

// 重新导出常用类型
pub use action::{ActionRecord, ActuatorState, CoilAddress, MoveMode};
pub use pose::{DOF, JointPose, Pose, PoseDelta, RotationConvention};

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid protocol id: {0}")]
    InvalidProtocolId(u16),

    #[error("Unexpected function code: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedFunction { expected: u8, actual: u8 },

    #[error("Transaction id mismatch: expected {expected}, got {actual}")]
    TransactionMismatch { expected: u16, actual: u16 },

    /// 设备返回的异常响应
    #[error(
        "Exception response for function 0x{function:02X}: {} (0x{code:02X})",
        modbus::exception_description(*code)
    )]
    Exception { function: u8, code: u8 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u16 },
}
