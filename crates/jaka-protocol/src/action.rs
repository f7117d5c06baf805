//! 动作记录与执行器状态

use crate::pose::PoseDelta;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 离散输出（线圈）状态，例如吸盘开/关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ActuatorState {
    #[default]
    Off,
    On,
}

impl ActuatorState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    /// 取反（键盘切换用）
    pub fn toggled(self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Off,
        }
    }
}

impl From<bool> for ActuatorState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl From<ActuatorState> for bool {
    fn from(state: ActuatorState) -> Self {
        state.is_on()
    }
}

impl std::fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::On => write!(f, "on"),
        }
    }
}

/// 线圈地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CoilAddress(pub u16);

impl CoilAddress {
    pub fn value(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for CoilAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "coil {}", self.0)
    }
}

/// 运动指令模式
///
/// 对应控制器 servo 指令的 `move_mode` 参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum MoveMode {
    /// 绝对运动
    Absolute = 0,
    /// 增量运动（遥操作默认）
    #[default]
    Incremental = 1,
}

/// 每个控制周期产生的动作
///
/// 位姿增量 + 可选的执行器意图，控制循环与从臂之间唯一的动作载荷。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionRecord {
    pub delta: PoseDelta,
    pub actuator: Option<ActuatorState>,
}

impl ActionRecord {
    pub fn new(delta: PoseDelta, actuator: Option<ActuatorState>) -> Self {
        Self { delta, actuator }
    }

    /// 仅包含位姿增量的动作
    pub fn motion(delta: PoseDelta) -> Self {
        Self {
            delta,
            actuator: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actuator_state_bool_conversions() {
        assert_eq!(ActuatorState::from(true), ActuatorState::On);
        assert_eq!(ActuatorState::from(false), ActuatorState::Off);
        assert!(bool::from(ActuatorState::On));
        assert_eq!(ActuatorState::On.toggled(), ActuatorState::Off);
        assert_eq!(ActuatorState::default(), ActuatorState::Off);
    }

    #[test]
    fn test_move_mode_repr() {
        assert_eq!(u8::from(MoveMode::Absolute), 0);
        assert_eq!(u8::from(MoveMode::Incremental), 1);
        assert_eq!(MoveMode::try_from(1u8).unwrap(), MoveMode::Incremental);
        assert!(MoveMode::try_from(7u8).is_err());
    }

    #[test]
    fn test_motion_record_has_no_intent() {
        let record = ActionRecord::motion(PoseDelta::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        assert!(record.actuator.is_none());
        assert_eq!(record.delta.as_array()[0], 1.0);
    }
}
