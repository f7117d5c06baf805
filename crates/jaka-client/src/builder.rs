//! 桥接器 Builder
//!
//! 链式 API 组装主臂、从臂、执行器和意图来源，校验配置后创建 [`TeleopBridge`]。

use crate::bridge::{BridgeConfig, TeleopBridge};
use crate::error::{Result, RobotError};
use crate::follower::FollowerDriver;
use crate::intent::IntentSource;
use jaka_driver::{DeltaCallback, FrequencyMonitor};
use jaka_link::{ArmLink, DiscreteActuator};
use std::sync::Arc;

/// 桥接器 Builder
///
/// # 示例
///
/// ```rust
/// use jaka_client::{FixedIntent, TeleopBridgeBuilder};
/// use jaka_link::{ModbusTcpActuator, ModbusTcpConfig, SimulatedArm};
///
/// # fn main() -> Result<(), jaka_client::RobotError> {
/// let bridge = TeleopBridgeBuilder::new()
///     .leader(SimulatedArm::new("leader"))
///     .follower_arm(SimulatedArm::new("follower"))
///     .actuator(ModbusTcpActuator::new(ModbusTcpConfig::default()))
///     .intent(FixedIntent::default())
///     .build()?;
/// assert!(!bridge.state().is_connected());
/// # Ok(())
/// # }
/// ```
pub struct TeleopBridgeBuilder<L, I, F, D> {
    leader: Option<L>,
    intent: Option<I>,
    follower_arm: Option<F>,
    actuator: Option<D>,
    config: BridgeConfig,
    monitor: Option<Arc<FrequencyMonitor>>,
    callbacks: Vec<Arc<dyn DeltaCallback>>,
}

impl<L, I, F, D> Default for TeleopBridgeBuilder<L, I, F, D> {
    fn default() -> Self {
        Self {
            leader: None,
            intent: None,
            follower_arm: None,
            actuator: None,
            config: BridgeConfig::default(),
            monitor: None,
            callbacks: Vec::new(),
        }
    }
}

impl<L, I, F, D> TeleopBridgeBuilder<L, I, F, D>
where
    L: ArmLink + 'static,
    I: IntentSource,
    F: ArmLink,
    D: DiscreteActuator,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 主臂链路（采样线程读取）
    pub fn leader(mut self, leader: L) -> Self {
        self.leader = Some(leader);
        self
    }

    pub fn follower_arm(mut self, arm: F) -> Self {
        self.follower_arm = Some(arm);
        self
    }

    /// 吸盘执行器
    pub fn actuator(mut self, actuator: D) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn intent(mut self, intent: I) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// 共享的频率监控器（默认新建，窗口 2 秒）
    pub fn monitor(mut self, monitor: Arc<FrequencyMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// 注册增量回调，每次启动采样线程时传入
    pub fn delta_callback(mut self, callback: Arc<dyn DeltaCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn build(self) -> Result<TeleopBridge<L, I, F, D>> {
        self.config.validate()?;
        let leader = self.leader.ok_or_else(|| missing("leader arm"))?;
        let follower_arm = self.follower_arm.ok_or_else(|| missing("follower arm"))?;
        let actuator = self.actuator.ok_or_else(|| missing("actuator"))?;
        let intent = self.intent.ok_or_else(|| missing("intent source"))?;
        let monitor = self.monitor.unwrap_or_default();

        let follower = FollowerDriver::new(follower_arm, actuator, self.config.follower)
            .with_monitor(monitor.clone());
        Ok(TeleopBridge::from_parts(
            self.config,
            leader,
            intent,
            follower,
            monitor,
            self.callbacks,
        ))
    }
}

fn missing(part: &str) -> RobotError {
    RobotError::Configuration(format!("{} is required", part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::FixedIntent;
    use jaka_link::mock::{CallLog, MockActuator, MockArm};

    #[test]
    fn test_missing_parts_are_configuration_errors() {
        let log = CallLog::new();
        let result = TeleopBridgeBuilder::<MockArm, FixedIntent, MockArm, MockActuator>::new()
            .leader(MockArm::new("leader", log.clone()))
            .follower_arm(MockArm::new("follower", log))
            .intent(FixedIntent::default())
            .build();
        match result {
            Err(RobotError::Configuration(msg)) => assert!(msg.contains("actuator")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("build should fail without an actuator"),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let log = CallLog::new();
        let mut config = BridgeConfig::default();
        config.intervention_threshold = -1.0;
        let result = TeleopBridgeBuilder::new()
            .leader(MockArm::new("leader", log.clone()))
            .follower_arm(MockArm::new("follower", log.clone()))
            .actuator(MockActuator::new("sucker", log))
            .intent(FixedIntent::default())
            .config(config)
            .build();
        assert!(matches!(result, Err(RobotError::Configuration(_))));
    }
}
