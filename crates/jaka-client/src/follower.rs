//! 从臂驱动
//!
//! 把 [`ActionRecord`] 转发给从臂和吸盘：
//! - 位姿增量以 servo 相对运动发送，步数由 [`StepMode`] 决定
//! - 吸盘带滞回：只有期望状态与上一次成功写入的状态不同时才写线圈
//!
//! 失败在当前 tick 直接返回，不在这里重试。

use crate::error::{Result, RobotError};
use jaka_driver::{CONTROL_LOOP, FrequencyMonitor};
use jaka_link::{ArmLink, DiscreteActuator};
use jaka_protocol::{ActionRecord, ActuatorState, CoilAddress, JointPose, MoveMode};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) const FOLLOWER_ARM: &str = "follower arm";
pub(crate) const ACTUATOR: &str = "actuator";

/// 插补步数档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    /// 遥操作录制（平滑）
    #[default]
    Record,
    /// 点动（快速、粗糙）
    Jog,
    /// 关节目标
    Joint,
}

/// 各档位的插补步数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCounts {
    pub record: u32,
    pub jog: u32,
    pub joint: u32,
}

impl Default for StepCounts {
    fn default() -> Self {
        Self {
            record: 50,
            jog: 1,
            joint: 100_000,
        }
    }
}

impl StepCounts {
    pub fn for_mode(&self, mode: StepMode) -> u32 {
        match mode {
            StepMode::Record => self.record,
            StepMode::Jog => self.jog,
            StepMode::Joint => self.joint,
        }
    }
}

/// 从臂配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowerConfig {
    pub steps: StepCounts,
    /// 位姿增量的运动模式（默认增量）
    pub move_mode: MoveMode,
    /// 关节目标的运动模式（默认绝对）
    pub joint_move_mode: MoveMode,
    pub robot_index: u8,
    /// 吸盘线圈地址
    pub coil: CoilAddress,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            steps: StepCounts::default(),
            move_mode: MoveMode::Incremental,
            joint_move_mode: MoveMode::Absolute,
            robot_index: 0,
            coil: CoilAddress(8),
        }
    }
}

/// 从臂观测
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub joints: JointPose,
    /// 线圈的实时读数
    pub actuator: ActuatorState,
}

/// 从臂驱动
pub struct FollowerDriver<F, D> {
    arm: F,
    actuator: D,
    config: FollowerConfig,
    committed: ActuatorState,
    monitor: Option<Arc<FrequencyMonitor>>,
}

impl<F: ArmLink, D: DiscreteActuator> FollowerDriver<F, D> {
    pub fn new(arm: F, actuator: D, config: FollowerConfig) -> Self {
        Self {
            arm,
            actuator,
            config,
            committed: ActuatorState::Off,
            monitor: None,
        }
    }

    /// 每次成功 `apply` 后 tick `"control"` 循环
    pub fn with_monitor(mut self, monitor: Arc<FrequencyMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &FollowerConfig {
        &self.config
    }

    /// 上一次成功写入（或观测到）的吸盘状态
    pub fn last_commanded(&self) -> ActuatorState {
        self.committed
    }

    pub fn arm(&self) -> &F {
        &self.arm
    }

    pub fn actuator(&self) -> &D {
        &self.actuator
    }

    /// 先连接从臂，再连接执行器；执行器失败时回滚从臂
    pub fn connect(&mut self) -> Result<()> {
        self.arm
            .connect()
            .map_err(|source| RobotError::Connectivity {
                device: FOLLOWER_ARM,
                source,
            })?;
        info!("Follower arm connected");

        if let Err(source) = self.actuator.connect() {
            if let Err(e) = self.arm.disconnect() {
                warn!("Rollback: follower arm disconnect failed: {}", e);
            }
            return Err(RobotError::Connectivity {
                device: ACTUATOR,
                source,
            });
        }
        info!("Actuator connected");
        Ok(())
    }

    /// 尽力断开两条链路，返回第一个错误
    pub fn disconnect(&mut self) -> Result<()> {
        let arm = self.arm.disconnect().map_err(|e| {
            warn!("Follower arm disconnect failed: {}", e);
            RobotError::link(FOLLOWER_ARM, e)
        });
        let actuator = self.actuator.disconnect().map_err(|e| {
            warn!("Actuator disconnect failed: {}", e);
            RobotError::link(ACTUATOR, e)
        });
        arm.and(actuator)
    }

    /// 执行一条动作记录
    pub fn apply(&mut self, record: &ActionRecord, mode: StepMode) -> Result<()> {
        let step_count = self.config.steps.for_mode(mode);
        debug!(
            "Sending delta {:?} (steps={})",
            record.delta.as_array(),
            step_count
        );
        self.arm
            .send_pose_delta(
                &record.delta,
                step_count,
                self.config.move_mode,
                self.config.robot_index,
            )
            .map_err(|e| RobotError::link(FOLLOWER_ARM, e))?;

        if let Some(desired) = record.actuator {
            self.command_actuator(desired)?;
        }

        if let Some(monitor) = &self.monitor {
            monitor.tick(CONTROL_LOOP);
        }
        Ok(())
    }

    /// 吸盘滞回：状态变化时写一次线圈，返回是否发生了写入
    ///
    /// 写入失败时记住的状态保持不变，下一次调用会重试。
    pub fn command_actuator(&mut self, desired: ActuatorState) -> Result<bool> {
        if desired == self.committed {
            return Ok(false);
        }
        self.actuator
            .write_state(self.config.coil, desired)
            .map_err(|e| RobotError::link(ACTUATOR, e))?;
        self.committed = desired;
        info!("Actuator state set to: {}", desired);
        Ok(true)
    }

    /// 读取关节位置和线圈实时状态
    ///
    /// 线圈读数会同步为滞回的比较基准。
    pub fn observe(&mut self) -> Result<Observation> {
        let joints = self
            .arm
            .read_joint_pose()
            .map_err(|e| RobotError::link(FOLLOWER_ARM, e))?;
        let actuator = self
            .actuator
            .read_state(self.config.coil)
            .map_err(|e| RobotError::link(ACTUATOR, e))?;
        self.committed = actuator;
        Ok(Observation { joints, actuator })
    }

    /// 发送关节目标
    pub fn send_joint_target(&mut self, target: &JointPose) -> Result<()> {
        self.arm
            .send_joint_target(
                target,
                self.config.steps.for_mode(StepMode::Joint),
                self.config.joint_move_mode,
                self.config.robot_index,
            )
            .map_err(|e| RobotError::link(FOLLOWER_ARM, e))
    }
}
