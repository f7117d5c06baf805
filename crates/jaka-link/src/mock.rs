//! Mock 链路（测试替身）
//!
//! 所有调用按发生顺序记录到共享的 [`CallLog`]，多个设备可以共用一个日志，
//! 便于断言跨设备的调用顺序（例如“采样线程退出后才允许断开主臂”）。

use crate::{ArmLink, DiscreteActuator, LinkError};
use jaka_protocol::{ActuatorState, CoilAddress, JointPose, MoveMode, Pose, PoseDelta};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 一次链路调用
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCall {
    Connect(&'static str),
    Disconnect(&'static str),
    ReadCartesianPose(&'static str),
    ReadJointPose(&'static str),
    SendPoseDelta {
        device: &'static str,
        delta: PoseDelta,
        step_count: u32,
        move_mode: MoveMode,
        robot_index: u8,
    },
    SendJointTarget {
        device: &'static str,
        target: JointPose,
        step_count: u32,
    },
    ReadState(&'static str, CoilAddress),
    WriteState(&'static str, CoilAddress, ActuatorState),
    /// 测试代码插入的标记（例如“采样线程已退出”）
    Marker(String),
}

/// 共享调用日志
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<LinkCall>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: LinkCall) {
        self.calls.lock().push(call);
    }

    pub fn mark(&self, label: impl Into<String>) {
        self.push(LinkCall::Marker(label.into()));
    }

    pub fn snapshot(&self) -> Vec<LinkCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// 满足条件的调用次数
    pub fn count(&self, pred: impl Fn(&LinkCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// 第一个满足条件的调用位置
    pub fn position(&self, pred: impl Fn(&LinkCall) -> bool) -> Option<usize> {
        self.calls.lock().iter().position(|c| pred(c))
    }
}

/// 故障注入开关（可在测试线程中随时切换）
#[derive(Debug, Clone, Default)]
pub struct FailSwitch(Arc<AtomicBool>);

impl FailSwitch {
    pub fn set(&self, fail: bool) {
        self.0.store(fail, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Mock 机械臂
///
/// `read_cartesian_pose` 依次返回脚本中的位姿；脚本耗尽后重复最后一个。
pub struct MockArm {
    device: &'static str,
    log: CallLog,
    script: VecDeque<Pose>,
    last: Pose,
    joints: JointPose,
    read_delay: Duration,
    connected: bool,
    pub fail_connect: FailSwitch,
    pub fail_reads: FailSwitch,
    pub fail_sends: FailSwitch,
}

impl MockArm {
    pub fn new(device: &'static str, log: CallLog) -> Self {
        Self {
            device,
            log,
            script: VecDeque::new(),
            last: Pose::ZERO,
            joints: JointPose::ZERO,
            read_delay: Duration::ZERO,
            connected: false,
            fail_connect: FailSwitch::default(),
            fail_reads: FailSwitch::default(),
            fail_sends: FailSwitch::default(),
        }
    }

    /// 设置位姿脚本
    pub fn with_poses(mut self, poses: impl IntoIterator<Item = Pose>) -> Self {
        self.script = poses.into_iter().collect();
        self
    }

    pub fn with_joints(mut self, joints: JointPose) -> Self {
        self.joints = joints;
        self
    }

    /// 模拟阻塞读取耗时
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    fn check(&self, switch: &FailSwitch, what: &str) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        if switch.is_set() {
            return Err(LinkError::Read(format!("{}: injected {} failure", self.device, what)));
        }
        Ok(())
    }
}

impl ArmLink for MockArm {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.log.push(LinkCall::Connect(self.device));
        if self.fail_connect.is_set() {
            return Err(LinkError::connect(self.device, "injected connect failure"));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        self.log.push(LinkCall::Disconnect(self.device));
        self.connected = false;
        Ok(())
    }

    fn read_cartesian_pose(&mut self) -> Result<Pose, LinkError> {
        self.log.push(LinkCall::ReadCartesianPose(self.device));
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        self.check(&self.fail_reads, "read")?;
        if let Some(pose) = self.script.pop_front() {
            self.last = pose;
        }
        Ok(self.last)
    }

    fn read_joint_pose(&mut self) -> Result<JointPose, LinkError> {
        self.log.push(LinkCall::ReadJointPose(self.device));
        self.check(&self.fail_reads, "read")?;
        Ok(self.joints)
    }

    fn send_pose_delta(
        &mut self,
        delta: &PoseDelta,
        step_count: u32,
        move_mode: MoveMode,
        robot_index: u8,
    ) -> Result<(), LinkError> {
        self.log.push(LinkCall::SendPoseDelta {
            device: self.device,
            delta: *delta,
            step_count,
            move_mode,
            robot_index,
        });
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        if self.fail_sends.is_set() {
            return Err(LinkError::Write(format!("{}: injected send failure", self.device)));
        }
        Ok(())
    }

    fn send_joint_target(
        &mut self,
        target: &JointPose,
        step_count: u32,
        _move_mode: MoveMode,
        _robot_index: u8,
    ) -> Result<(), LinkError> {
        self.log.push(LinkCall::SendJointTarget {
            device: self.device,
            target: *target,
            step_count,
        });
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        if self.fail_sends.is_set() {
            return Err(LinkError::Write(format!("{}: injected send failure", self.device)));
        }
        self.joints = *target;
        Ok(())
    }
}

/// Mock 离散执行器
pub struct MockActuator {
    device: &'static str,
    log: CallLog,
    coils: HashMap<u16, ActuatorState>,
    connected: bool,
    pub fail_connect: FailSwitch,
    pub fail_writes: FailSwitch,
}

impl MockActuator {
    pub fn new(device: &'static str, log: CallLog) -> Self {
        Self {
            device,
            log,
            coils: HashMap::new(),
            connected: false,
            fail_connect: FailSwitch::default(),
            fail_writes: FailSwitch::default(),
        }
    }
}

impl DiscreteActuator for MockActuator {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.log.push(LinkCall::Connect(self.device));
        if self.fail_connect.is_set() {
            return Err(LinkError::connect(self.device, "injected connect failure"));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        self.log.push(LinkCall::Disconnect(self.device));
        self.connected = false;
        Ok(())
    }

    fn read_state(&mut self, address: CoilAddress) -> Result<ActuatorState, LinkError> {
        self.log.push(LinkCall::ReadState(self.device, address));
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        Ok(self.coils.get(&address.value()).copied().unwrap_or_default())
    }

    fn write_state(&mut self, address: CoilAddress, state: ActuatorState) -> Result<(), LinkError> {
        self.log.push(LinkCall::WriteState(self.device, address, state));
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        if self.fail_writes.is_set() {
            return Err(LinkError::Write(format!("{}: injected write failure", self.device)));
        }
        self.coils.insert(address.value(), state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_arm_replays_script_then_repeats_last() {
        let log = CallLog::new();
        let mut arm = MockArm::new("leader", log.clone()).with_poses([
            Pose::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            Pose::new([2.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ]);
        arm.connect().unwrap();
        assert_eq!(arm.read_cartesian_pose().unwrap().as_array()[0], 1.0);
        assert_eq!(arm.read_cartesian_pose().unwrap().as_array()[0], 2.0);
        assert_eq!(arm.read_cartesian_pose().unwrap().as_array()[0], 2.0);
        assert_eq!(log.count(|c| matches!(c, LinkCall::ReadCartesianPose(_))), 3);
    }

    #[test]
    fn test_fail_switch_injects_errors() {
        let log = CallLog::new();
        let mut arm = MockArm::new("leader", log);
        arm.connect().unwrap();
        arm.fail_reads.set(true);
        assert!(arm.read_cartesian_pose().is_err());
        arm.fail_reads.set(false);
        assert!(arm.read_cartesian_pose().is_ok());
    }

    #[test]
    fn test_mock_actuator_records_writes() {
        let log = CallLog::new();
        let mut act = MockActuator::new("sucker", log.clone());
        act.connect().unwrap();
        act.write_state(CoilAddress(8), ActuatorState::On).unwrap();
        assert_eq!(act.read_state(CoilAddress(8)).unwrap(), ActuatorState::On);
        assert_eq!(
            log.position(|c| matches!(c, LinkCall::WriteState(_, _, ActuatorState::On))),
            Some(1)
        );
    }
}
