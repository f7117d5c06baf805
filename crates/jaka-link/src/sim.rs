//! 仿真机械臂
//!
//! 纯软件的 [`ArmLink`] 实现，用于无硬件调试和 CLI 演示：
//! - 作为从臂：把增量指令累加到内部位姿上，绝对指令直接覆盖
//! - 作为主臂：位姿由 `motion` 函数按连接后的时间生成
//!
//! [`SimulatedActuator`] 是对应的仿真线圈。

use crate::{ArmLink, DiscreteActuator, LinkError};
use jaka_protocol::{ActuatorState, CoilAddress, DOF, JointPose, MoveMode, Pose, PoseDelta};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

type MotionFn = dyn Fn(Duration) -> Pose + Send + Sync;

#[derive(Debug, Default)]
struct SimState {
    connected: bool,
    pose: Pose,
    joints: JointPose,
    commands: u64,
}

/// 仿真臂内部状态的只读句柄（可跨线程持有）
#[derive(Clone)]
pub struct SimulatedArmHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedArmHandle {
    pub fn pose(&self) -> Pose {
        self.state.lock().pose
    }

    pub fn joints(&self) -> JointPose {
        self.state.lock().joints
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// 已执行的运动指令数
    pub fn command_count(&self) -> u64 {
        self.state.lock().commands
    }
}

/// 仿真机械臂
pub struct SimulatedArm {
    name: String,
    state: Arc<Mutex<SimState>>,
    motion: Option<Box<MotionFn>>,
    connected_at: Option<Instant>,
}

impl SimulatedArm {
    /// 静止的仿真臂（从臂）
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(SimState::default())),
            motion: None,
            connected_at: None,
        }
    }

    /// 按时间函数运动的仿真臂（主臂）
    ///
    /// # Example
    ///
    /// ```
    /// use jaka_link::SimulatedArm;
    /// use jaka_protocol::Pose;
    ///
    /// let leader = SimulatedArm::with_motion("leader", |t| {
    ///     let x = (t.as_secs_f64() * 0.5).sin() * 10.0;
    ///     Pose::new([x, 0.0, 0.0, 0.0, 0.0, 0.0])
    /// });
    /// ```
    pub fn with_motion(
        name: impl Into<String>,
        motion: impl Fn(Duration) -> Pose + Send + Sync + 'static,
    ) -> Self {
        Self {
            motion: Some(Box::new(motion)),
            ..Self::new(name)
        }
    }

    pub fn handle(&self) -> SimulatedArmHandle {
        SimulatedArmHandle {
            state: self.state.clone(),
        }
    }

    fn ensure_connected(&self) -> Result<(), LinkError> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(LinkError::NotConnected)
        }
    }
}

impl ArmLink for SimulatedArm {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.state.lock().connected = true;
        self.connected_at = Some(Instant::now());
        info!("Simulated arm '{}' connected", self.name);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        self.state.lock().connected = false;
        self.connected_at = None;
        info!("Simulated arm '{}' disconnected", self.name);
        Ok(())
    }

    fn read_cartesian_pose(&mut self) -> Result<Pose, LinkError> {
        self.ensure_connected()?;
        let mut state = self.state.lock();
        if let (Some(motion), Some(t0)) = (&self.motion, self.connected_at) {
            state.pose = motion(t0.elapsed());
        }
        Ok(state.pose)
    }

    fn read_joint_pose(&mut self) -> Result<JointPose, LinkError> {
        self.ensure_connected()?;
        Ok(self.state.lock().joints)
    }

    fn send_pose_delta(
        &mut self,
        delta: &PoseDelta,
        step_count: u32,
        move_mode: MoveMode,
        _robot_index: u8,
    ) -> Result<(), LinkError> {
        self.ensure_connected()?;
        let mut state = self.state.lock();
        let next = match move_mode {
            MoveMode::Incremental => {
                let mut values = *state.pose.as_array();
                for (v, d) in values.iter_mut().zip(delta.as_array()) {
                    *v += d;
                }
                values
            },
            MoveMode::Absolute => *delta.as_array(),
        };
        state.pose = Pose::new(next);
        state.commands += 1;
        debug!(
            "Simulated arm '{}' pose -> {:?} (steps={})",
            self.name, next, step_count
        );
        Ok(())
    }

    fn send_joint_target(
        &mut self,
        target: &JointPose,
        _step_count: u32,
        move_mode: MoveMode,
        _robot_index: u8,
    ) -> Result<(), LinkError> {
        self.ensure_connected()?;
        let mut state = self.state.lock();
        let mut next = [0.0; DOF];
        for (i, n) in next.iter_mut().enumerate() {
            *n = match move_mode {
                MoveMode::Incremental => state.joints.as_array()[i] + target.as_array()[i],
                MoveMode::Absolute => target.as_array()[i],
            };
        }
        state.joints = JointPose::new(next);
        state.commands += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CoilBank {
    connected: bool,
    coils: HashMap<u16, ActuatorState>,
    writes: u64,
}

/// 仿真线圈执行器
///
/// 未写过的线圈读出 `Off`。
#[derive(Clone, Default)]
pub struct SimulatedActuator {
    bank: Arc<Mutex<CoilBank>>,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 不经过链路直接查看线圈（克隆共享同一组线圈）
    pub fn peek(&self, address: CoilAddress) -> ActuatorState {
        self.bank
            .lock()
            .coils
            .get(&address.value())
            .copied()
            .unwrap_or_default()
    }

    pub fn write_count(&self) -> u64 {
        self.bank.lock().writes
    }
}

impl DiscreteActuator for SimulatedActuator {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.bank.lock().connected = true;
        info!("Simulated actuator connected");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        self.bank.lock().connected = false;
        Ok(())
    }

    fn read_state(&mut self, address: CoilAddress) -> Result<ActuatorState, LinkError> {
        let bank = self.bank.lock();
        if !bank.connected {
            return Err(LinkError::NotConnected);
        }
        Ok(bank.coils.get(&address.value()).copied().unwrap_or_default())
    }

    fn write_state(&mut self, address: CoilAddress, state: ActuatorState) -> Result<(), LinkError> {
        let mut bank = self.bank.lock();
        if !bank.connected {
            return Err(LinkError::NotConnected);
        }
        bank.coils.insert(address.value(), state);
        bank.writes += 1;
        debug!("Simulated coil {} -> {:?}", address.value(), state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_connect() {
        let mut arm = SimulatedArm::new("follower");
        assert!(matches!(
            arm.read_cartesian_pose(),
            Err(LinkError::NotConnected)
        ));
        arm.connect().unwrap();
        assert_eq!(arm.read_cartesian_pose().unwrap(), Pose::ZERO);
    }

    #[test]
    fn test_incremental_moves_accumulate() {
        let mut arm = SimulatedArm::new("follower");
        let handle = arm.handle();
        arm.connect().unwrap();

        let delta = PoseDelta::new([1.0, 0.0, 0.5, 0.0, 0.0, -0.1]);
        arm.send_pose_delta(&delta, 50, MoveMode::Incremental, 0).unwrap();
        arm.send_pose_delta(&delta, 50, MoveMode::Incremental, 0).unwrap();

        let pose = handle.pose();
        assert_eq!(pose.as_array()[0], 2.0);
        assert_eq!(pose.as_array()[2], 1.0);
        assert!((pose.as_array()[5] + 0.2).abs() < 1e-12);
        assert_eq!(handle.command_count(), 2);
    }

    #[test]
    fn test_absolute_joint_target() {
        let mut arm = SimulatedArm::new("follower");
        arm.connect().unwrap();
        let target = JointPose::new([0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        arm.send_joint_target(&target, 100_000, MoveMode::Absolute, 0)
            .unwrap();
        assert_eq!(arm.read_joint_pose().unwrap(), target);
    }

    #[test]
    fn test_motion_function_drives_leader_pose() {
        let mut arm = SimulatedArm::with_motion("leader", |_| {
            Pose::new([5.0, 0.0, 0.0, 0.0, 0.0, 0.0])
        });
        arm.connect().unwrap();
        assert_eq!(arm.read_cartesian_pose().unwrap().as_array()[0], 5.0);
        arm.disconnect().unwrap();
        assert!(!arm.handle().is_connected());
    }

    #[test]
    fn test_simulated_actuator_coils() {
        let mut actuator = SimulatedActuator::new();
        let observer = actuator.clone();
        assert!(actuator.read_state(CoilAddress(8)).is_err());

        actuator.connect().unwrap();
        assert_eq!(actuator.read_state(CoilAddress(8)).unwrap(), ActuatorState::Off);
        actuator.write_state(CoilAddress(8), ActuatorState::On).unwrap();
        assert_eq!(observer.peek(CoilAddress(8)), ActuatorState::On);
        assert_eq!(observer.peek(CoilAddress(9)), ActuatorState::Off);
        assert_eq!(observer.write_count(), 1);
    }
}
