//! 桥接器生命周期状态
//!
//! ```text
//! Disconnected → Connecting → Connected → SamplingActive ⇄ Faulted → Disconnected
//! ```
//!
//! 故障状态不会自动恢复，必须 `disconnect()` 后重新 `connect()`。

use std::fmt;

/// 桥接器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    #[default]
    Disconnected,
    /// 正在依次连接主臂、从臂、执行器
    Connecting,
    /// 全部链路已连接，采样线程未运行
    Connected,
    /// 采样线程运行中，可以 `tick`/`step`
    SamplingActive,
    /// 连接失败或故障升级后进入，只能 `disconnect()`
    Faulted,
}

impl BridgeState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::SamplingActive)
    }

    pub fn is_faulted(self) -> bool {
        self == Self::Faulted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::SamplingActive => "SamplingActive",
            Self::Faulted => "Faulted",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(!BridgeState::Disconnected.is_connected());
        assert!(BridgeState::Connected.is_connected());
        assert!(BridgeState::SamplingActive.is_connected());
        assert!(!BridgeState::Faulted.is_connected());
        assert!(BridgeState::Faulted.is_faulted());
        assert_eq!(BridgeState::default(), BridgeState::Disconnected);
        assert_eq!(BridgeState::SamplingActive.to_string(), "SamplingActive");
    }
}
