//! # Jaka Link Layer
//!
//! 设备能力抽象层：机械臂链路（`ArmLink`）和离散执行器（`DiscreteActuator`）。
//!
//! 厂商 SDK 调用（登录、上电、使能、servo 模式、位姿查询）都隐藏在 `ArmLink`
//! 之后；吸盘等离散输出通过 `DiscreteActuator` 访问。
//!
//! ## 实现
//!
//! - [`ModbusTcpActuator`]: Modbus-TCP 线圈（吸盘）
//! - [`SimulatedArm`] / [`SimulatedActuator`]: 纯软件仿真，用于无硬件运行
//! - `mock`（feature = "mock"）：记录调用顺序的测试替身

use jaka_protocol::{
    ActuatorState, CoilAddress, JointPose, MoveMode, Pose, PoseDelta, ProtocolError,
};
use thiserror::Error;

pub mod modbus_tcp;
pub mod sim;

#[cfg(feature = "mock")]
pub mod mock;

pub use modbus_tcp::{ModbusTcpActuator, ModbusTcpConfig};
pub use sim::{SimulatedActuator, SimulatedArm, SimulatedArmHandle};

/// 链路层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    /// 连接/握手失败（登录、上电、使能、TCP 建链等）
    #[error("Connect to {target} failed: {reason}")]
    Connect { target: String, reason: String },
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// 已连接链路的读失败
    #[error("Read failed: {0}")]
    Read(String),
    /// 已连接链路的写失败
    #[error("Write failed: {0}")]
    Write(String),
    /// 设备返回了错误响应
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Link not connected")]
    NotConnected,
    #[error("Operation timeout")]
    Timeout,
}

impl LinkError {
    pub fn connect(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connect {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// 是否为连接类错误（链路不可达或握手失败）
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::NotConnected)
    }

    /// 是否为协议类错误（设备返回错误响应）
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// 机械臂链路
///
/// 所有调用都是阻塞且可能失败的；失败必须以 `Err` 返回，不能用默认值代替。
pub trait ArmLink: Send {
    /// 登录、上电、使能并进入 servo 模式
    fn connect(&mut self) -> Result<(), LinkError>;
    fn disconnect(&mut self) -> Result<(), LinkError>;
    /// 读取 TCP 笛卡尔位姿
    fn read_cartesian_pose(&mut self) -> Result<Pose, LinkError>;
    /// 读取关节位置
    fn read_joint_pose(&mut self) -> Result<JointPose, LinkError>;
    /// 发送笛卡尔相对运动
    ///
    /// `step_count` 为控制器插补步数：越大越平滑/越慢，越小越快/越粗。
    fn send_pose_delta(
        &mut self,
        delta: &PoseDelta,
        step_count: u32,
        move_mode: MoveMode,
        robot_index: u8,
    ) -> Result<(), LinkError>;
    /// 发送关节目标
    fn send_joint_target(
        &mut self,
        target: &JointPose,
        step_count: u32,
        move_mode: MoveMode,
        robot_index: u8,
    ) -> Result<(), LinkError>;
}

impl<T: ArmLink + ?Sized> ArmLink for Box<T> {
    fn connect(&mut self) -> Result<(), LinkError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        (**self).disconnect()
    }

    fn read_cartesian_pose(&mut self) -> Result<Pose, LinkError> {
        (**self).read_cartesian_pose()
    }

    fn read_joint_pose(&mut self) -> Result<JointPose, LinkError> {
        (**self).read_joint_pose()
    }

    fn send_pose_delta(
        &mut self,
        delta: &PoseDelta,
        step_count: u32,
        move_mode: MoveMode,
        robot_index: u8,
    ) -> Result<(), LinkError> {
        (**self).send_pose_delta(delta, step_count, move_mode, robot_index)
    }

    fn send_joint_target(
        &mut self,
        target: &JointPose,
        step_count: u32,
        move_mode: MoveMode,
        robot_index: u8,
    ) -> Result<(), LinkError> {
        (**self).send_joint_target(target, step_count, move_mode, robot_index)
    }
}

/// 离散执行器（线圈）
pub trait DiscreteActuator: Send {
    fn connect(&mut self) -> Result<(), LinkError>;
    fn disconnect(&mut self) -> Result<(), LinkError>;
    fn read_state(&mut self, address: CoilAddress) -> Result<ActuatorState, LinkError>;
    fn write_state(&mut self, address: CoilAddress, state: ActuatorState) -> Result<(), LinkError>;
}

impl<T: DiscreteActuator + ?Sized> DiscreteActuator for Box<T> {
    fn connect(&mut self) -> Result<(), LinkError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        (**self).disconnect()
    }

    fn read_state(&mut self, address: CoilAddress) -> Result<ActuatorState, LinkError> {
        (**self).read_state(address)
    }

    fn write_state(&mut self, address: CoilAddress, state: ActuatorState) -> Result<(), LinkError> {
        (**self).write_state(address, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_classification() {
        assert!(LinkError::connect("192.168.1.5", "refused").is_connectivity());
        assert!(LinkError::NotConnected.is_connectivity());
        assert!(!LinkError::Read("timeout".into()).is_connectivity());

        let err = LinkError::from(ProtocolError::InvalidProtocolId(3));
        assert!(err.is_protocol());
        assert!(!err.is_connectivity());
    }

    #[test]
    fn test_link_error_display() {
        let err = LinkError::connect("192.168.1.8:502", "connection refused");
        assert_eq!(
            format!("{}", err),
            "Connect to 192.168.1.8:502 failed: connection refused"
        );
        assert_eq!(format!("{}", LinkError::NotConnected), "Link not connected");
    }
}
