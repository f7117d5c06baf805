//! 客户端错误类型
//!
//! 按故障类别分层：连接故障（Connectivity）、I/O 故障、协议故障、配置错误、
//! 状态错误。每个链路错误都带上出错的设备名，便于日志定位。

use crate::state::BridgeState;
use jaka_driver::DriverError;
use jaka_link::LinkError;
use thiserror::Error;

/// 故障类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// 链路不可达或握手失败
    Connectivity,
    /// 已连接链路的读写失败
    Io,
    /// 设备返回错误响应
    Protocol,
    /// 配置值无效
    Configuration,
    /// 当前生命周期状态不允许该操作
    State,
}

/// 客户端错误类型
#[derive(Debug, Error)]
pub enum RobotError {
    /// 连接故障
    #[error("Connectivity fault on {device}: {source}")]
    Connectivity {
        device: &'static str,
        #[source]
        source: LinkError,
    },

    /// 读写故障（可在下一个 tick 重试）
    #[error("I/O fault on {device}: {source}")]
    Io {
        device: &'static str,
        #[source]
        source: LinkError,
    },

    /// 协议故障
    #[error("Protocol fault on {device}: {source}")]
    Protocol {
        device: &'static str,
        #[source]
        source: LinkError,
    },

    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 当前状态不允许该操作
    #[error("Invalid state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: &'static str,
        actual: BridgeState,
    },

    /// 桥接器处于故障状态，需要 disconnect 后重新 connect
    #[error("Bridge faulted: {reason}")]
    Faulted { reason: String },

    /// 采样线程未能在超时内退出，链路仍由其持有
    #[error("Sampler thread still running; links cannot be released yet")]
    SamplerBusy,

    /// 驱动层错误
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl RobotError {
    /// 按链路错误的类型归类
    pub fn link(device: &'static str, source: LinkError) -> Self {
        if source.is_connectivity() {
            Self::Connectivity { device, source }
        } else if source.is_protocol() {
            Self::Protocol { device, source }
        } else {
            Self::Io { device, source }
        }
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Connectivity { .. } => FaultKind::Connectivity,
            Self::Io { .. } => FaultKind::Io,
            Self::Protocol { .. } => FaultKind::Protocol,
            Self::Configuration(_) => FaultKind::Configuration,
            Self::InvalidState { .. } | Self::Faulted { .. } | Self::SamplerBusy => {
                FaultKind::State
            },
            Self::Driver(DriverError::Link(e)) if e.is_connectivity() => FaultKind::Connectivity,
            Self::Driver(_) => FaultKind::Io,
        }
    }

    /// 是否必须终止会话（不能通过重试恢复）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. } | Self::Faulted { .. } | Self::Driver(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RobotError>;

#[cfg(test)]
mod tests {
    use super::*;
    use jaka_protocol::ProtocolError;

    #[test]
    fn test_link_error_classification() {
        let err = RobotError::link("actuator", LinkError::connect("192.168.1.8:502", "refused"));
        assert_eq!(err.kind(), FaultKind::Connectivity);
        assert!(err.is_fatal());

        let err = RobotError::link("follower arm", LinkError::Write("servo rejected".into()));
        assert_eq!(err.kind(), FaultKind::Io);
        assert!(!err.is_fatal());

        let err = RobotError::link("actuator", ProtocolError::InvalidProtocolId(7).into());
        assert_eq!(err.kind(), FaultKind::Protocol);
    }

    #[test]
    fn test_state_errors() {
        let err = RobotError::InvalidState {
            expected: "Connected",
            actual: BridgeState::Disconnected,
        };
        assert_eq!(err.kind(), FaultKind::State);
        assert_eq!(
            err.to_string(),
            "Invalid state: expected Connected, actual Disconnected"
        );
        assert_eq!(RobotError::SamplerBusy.kind(), FaultKind::State);
        assert_eq!(
            RobotError::Configuration("bad".into()).kind(),
            FaultKind::Configuration
        );
    }

    #[test]
    fn test_error_display_includes_device() {
        let err = RobotError::link("leader arm", LinkError::Timeout);
        assert_eq!(err.to_string(), "I/O fault on leader arm: Operation timeout");
    }
}
