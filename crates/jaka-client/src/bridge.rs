//! 主从遥操作桥接器
//!
//! 组合主臂采样线程、执行器意图和从臂驱动，并管理整个会话的生命周期。
//!
//! # 控制流
//!
//! ```text
//! 主臂 ──(采样线程, 20 Hz)──► DeltaPublisher ──► tick() ──► ActionRecord ──► apply() ──► 从臂/吸盘
//!                                                  ▲
//!                                    IntentSource ─┘
//! ```
//!
//! `tick()` 不做任何链路 I/O，只读取发布槽和意图；`apply()` 负责写从臂。
//! 连续 `apply` 失败达到 [`FaultPolicy`] 上限后进入 `Faulted`。

use crate::error::{Result, RobotError};
use crate::follower::{FollowerConfig, FollowerDriver, Observation, StepMode};
use crate::intent::IntentSource;
use crate::state::BridgeState;
use jaka_driver::{
    DeltaCallback, DeltaPublisher, DriverError, FrequencyMonitor, JoinError, PoseSampler,
    SamplerConfig, SamplerExitReason, SamplerHandle, SamplerMetrics, SamplerMetricsSnapshot,
};
use jaka_link::{ArmLink, DiscreteActuator};
use jaka_protocol::{ActionRecord, ActuatorState, JointPose, PoseDelta};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub(crate) const LEADER_ARM: &str = "leader arm";

/// 默认人工干预阈值（平移增量范数）
pub const DEFAULT_INTERVENTION_THRESHOLD: f64 = 1e-5;

/// 故障升级策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPolicy {
    /// 连续失败次数上限，达到后进入 `Faulted`
    pub max_consecutive_failures: u32,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
        }
    }
}

/// 桥接器配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BridgeConfig {
    pub sampler: SamplerConfig,
    pub follower: FollowerConfig,
    /// 平移增量范数超过该值视为人工干预
    pub intervention_threshold: f64,
    pub fault_policy: FaultPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            follower: FollowerConfig::default(),
            intervention_threshold: DEFAULT_INTERVENTION_THRESHOLD,
            fault_policy: FaultPolicy::default(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sampler.interval.is_zero() {
            return Err(RobotError::Configuration(
                "sampler interval must be positive".into(),
            ));
        }
        if self.sampler.retry.max_consecutive_failures == 0 {
            return Err(RobotError::Configuration(
                "sampler retry limit must be at least 1".into(),
            ));
        }
        if !self.intervention_threshold.is_finite() || self.intervention_threshold < 0.0 {
            return Err(RobotError::Configuration(format!(
                "intervention threshold must be a non-negative number, got {}",
                self.intervention_threshold
            )));
        }
        let steps = self.follower.steps;
        if steps.record == 0 || steps.jog == 0 || steps.joint == 0 {
            return Err(RobotError::Configuration(
                "step counts must be positive".into(),
            ));
        }
        if self.fault_policy.max_consecutive_failures == 0 {
            return Err(RobotError::Configuration(
                "fault policy limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// 每个 tick 的遥操作事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeleopEvents {
    pub is_intervention: bool,
    pub actuator: ActuatorState,
}

/// 主从遥操作桥接器
///
/// 通过 [`TeleopBridgeBuilder`](crate::TeleopBridgeBuilder) 创建。
pub struct TeleopBridge<L, I, F, D>
where
    L: ArmLink + 'static,
    I: IntentSource,
    F: ArmLink,
    D: DiscreteActuator,
{
    config: BridgeConfig,
    state: BridgeState,
    /// 采样线程运行时为 `None`（链路归线程所有）
    leader: Option<L>,
    sampler: Option<SamplerHandle<L>>,
    intent: I,
    follower: FollowerDriver<F, D>,
    publisher: Arc<DeltaPublisher>,
    monitor: Arc<FrequencyMonitor>,
    sampler_metrics: Arc<SamplerMetrics>,
    callbacks: Vec<Arc<dyn DeltaCallback>>,
    consecutive_failures: u32,
    fault_reason: Option<String>,
}

impl<L, I, F, D> TeleopBridge<L, I, F, D>
where
    L: ArmLink + 'static,
    I: IntentSource,
    F: ArmLink,
    D: DiscreteActuator,
{
    pub(crate) fn from_parts(
        config: BridgeConfig,
        leader: L,
        intent: I,
        follower: FollowerDriver<F, D>,
        monitor: Arc<FrequencyMonitor>,
        callbacks: Vec<Arc<dyn DeltaCallback>>,
    ) -> Self {
        Self {
            config,
            state: BridgeState::Disconnected,
            leader: Some(leader),
            sampler: None,
            intent,
            follower,
            publisher: Arc::new(DeltaPublisher::new()),
            monitor,
            sampler_metrics: Arc::new(SamplerMetrics::new()),
            callbacks,
            consecutive_failures: 0,
            fault_reason: None,
        }
    }

    // ==================== 查询 ====================

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// 进入 `Faulted` 的原因
    pub fn fault_reason(&self) -> Option<&str> {
        self.fault_reason.as_deref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn publisher(&self) -> &Arc<DeltaPublisher> {
        &self.publisher
    }

    pub fn monitor(&self) -> &Arc<FrequencyMonitor> {
        &self.monitor
    }

    /// 采样线程指标（跨多次 start 累计）
    pub fn sampler_metrics(&self) -> SamplerMetricsSnapshot {
        self.sampler_metrics.snapshot()
    }

    pub fn follower(&self) -> &FollowerDriver<F, D> {
        &self.follower
    }

    pub fn intent(&self) -> &I {
        &self.intent
    }

    /// 主臂链路（采样线程运行时不可用）
    pub fn leader(&self) -> Option<&L> {
        self.leader.as_ref()
    }

    // ==================== 生命周期 ====================

    /// 依次连接主臂、从臂、执行器
    ///
    /// 任一步失败时回滚已连接的链路，进入 `Faulted` 并返回连接故障。
    pub fn connect(&mut self) -> Result<()> {
        self.expect_state(BridgeState::Disconnected, "Disconnected")?;
        let Some(leader) = self.leader.as_mut() else {
            return Err(self.escalate(RobotError::Faulted {
                reason: "leader link was lost with a panicked sampler thread".into(),
            }));
        };

        self.state = BridgeState::Connecting;
        info!("Connecting teleoperation bridge");

        if let Err(source) = leader.connect() {
            return Err(self.escalate(RobotError::Connectivity {
                device: LEADER_ARM,
                source,
            }));
        }
        info!("Leader arm connected");

        if let Err(e) = self.follower.connect() {
            if let Some(leader) = self.leader.as_mut()
                && let Err(rollback) = leader.disconnect()
            {
                warn!("Rollback: leader arm disconnect failed: {}", rollback);
            }
            return Err(self.escalate(e));
        }

        self.state = BridgeState::Connected;
        self.consecutive_failures = 0;
        self.fault_reason = None;
        info!("Teleoperation bridge connected");
        Ok(())
    }

    /// 启动主臂采样线程
    ///
    /// 发布槽被清空，新线程的第一个增量为零。
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(BridgeState::Connected, "Connected")?;
        let Some(leader) = self.leader.take() else {
            return Err(self.escalate(RobotError::Faulted {
                reason: "leader link unavailable".into(),
            }));
        };

        self.publisher.reset();
        let mut sampler = PoseSampler::new(self.config.sampler, self.publisher.clone())
            .with_monitor(self.monitor.clone())
            .with_metrics(self.sampler_metrics.clone());
        for callback in &self.callbacks {
            sampler = sampler.with_callback(callback.clone());
        }

        match sampler.spawn(leader) {
            Ok(handle) => {
                self.sampler = Some(handle);
                self.state = BridgeState::SamplingActive;
                Ok(())
            },
            Err(e) => Err(self.escalate(RobotError::Driver(e))),
        }
    }

    /// 停止采样线程并等待其退出（有超时）
    ///
    /// 超时返回 [`RobotError::SamplerBusy`]，采样线程继续持有主臂链路，可以再次调用。
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.sampler.take() else {
            return Ok(());
        };

        match handle.stop(self.config.sampler.join_timeout) {
            Ok(exit) => {
                self.leader = Some(exit.link);
                match exit.reason {
                    SamplerExitReason::Stopped => {
                        if self.state == BridgeState::SamplingActive {
                            self.state = BridgeState::Connected;
                        }
                        info!("Sampling stopped");
                        Ok(())
                    },
                    SamplerExitReason::Faulted(e) => {
                        let err = self.escalate(RobotError::Driver(e));
                        debug!("Sampler had already faulted: {}", err);
                        Ok(())
                    },
                }
            },
            Err(JoinError::TimedOut(handle)) => {
                self.sampler = Some(handle);
                error!("Sampler did not stop in time; leader link still held by sampler");
                Err(RobotError::SamplerBusy)
            },
            Err(JoinError::Panicked) => Err(self.escalate(DriverError::ThreadPanicked.into())),
        }
    }

    /// 断开全部链路
    ///
    /// 先停止采样线程（必须在断开主臂之前），然后尽力断开各链路，错误只记录日志。
    pub fn disconnect(&mut self) -> Result<()> {
        if self.state == BridgeState::Disconnected {
            return Ok(());
        }

        match self.stop() {
            Err(RobotError::SamplerBusy) => return Err(RobotError::SamplerBusy),
            Err(e) => warn!("Sampler stop during disconnect: {}", e),
            Ok(()) => {},
        }

        if let Some(leader) = self.leader.as_mut()
            && let Err(e) = leader.disconnect()
        {
            warn!("Leader arm disconnect failed: {}", e);
        }
        if let Err(e) = self.follower.disconnect() {
            warn!("Follower disconnect failed: {}", e);
        }

        self.state = BridgeState::Disconnected;
        self.consecutive_failures = 0;
        self.fault_reason = None;
        info!("Teleoperation bridge disconnected");
        Ok(())
    }

    // ==================== 控制循环 ====================

    /// 生成当前 tick 的动作记录（不做链路 I/O）
    pub fn tick(&mut self) -> Result<ActionRecord> {
        self.poll_sampler();
        self.expect_state(BridgeState::SamplingActive, "SamplingActive")?;
        let record = ActionRecord::new(self.publisher.latest(), Some(self.intent.current()));
        Ok(record)
    }

    /// 当前增量是否构成人工干预
    pub fn intervention(&self) -> bool {
        is_intervention(&self.publisher.latest(), self.config.intervention_threshold)
    }

    pub fn events(&self) -> TeleopEvents {
        TeleopEvents {
            is_intervention: self.intervention(),
            actuator: self.intent.current(),
        }
    }

    /// 由某条动作记录本身计算事件，不再读取发布槽
    pub fn events_for(&self, record: &ActionRecord) -> TeleopEvents {
        TeleopEvents {
            is_intervention: is_intervention(&record.delta, self.config.intervention_threshold),
            actuator: record.actuator.unwrap_or_else(|| self.intent.current()),
        }
    }

    /// 把动作记录发给从臂和吸盘
    pub fn apply(&mut self, record: &ActionRecord, mode: StepMode) -> Result<()> {
        self.expect_follower_ready()?;
        let result = self.follower.apply(record, mode);
        self.track(result)
    }

    /// `tick` + `apply`
    pub fn step(&mut self, mode: StepMode) -> Result<ActionRecord> {
        let record = self.tick()?;
        self.apply(&record, mode)?;
        Ok(record)
    }

    /// 读取从臂观测（关节位置 + 线圈实时状态）
    pub fn observe(&mut self) -> Result<Observation> {
        self.expect_follower_ready()?;
        let result = self.follower.observe();
        self.track(result)
    }

    pub fn send_joint_target(&mut self, target: &JointPose) -> Result<()> {
        self.expect_follower_ready()?;
        let result = self.follower.send_joint_target(target);
        self.track(result)
    }

    // ==================== 内部 ====================

    fn expect_state(&self, expected: BridgeState, name: &'static str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        if self.state == BridgeState::Faulted {
            return Err(self.faulted_error());
        }
        Err(RobotError::InvalidState {
            expected: name,
            actual: self.state,
        })
    }

    fn expect_follower_ready(&mut self) -> Result<()> {
        self.poll_sampler();
        match self.state {
            BridgeState::Connected | BridgeState::SamplingActive => Ok(()),
            BridgeState::Faulted => Err(self.faulted_error()),
            actual => Err(RobotError::InvalidState {
                expected: "Connected or SamplingActive",
                actual,
            }),
        }
    }

    fn faulted_error(&self) -> RobotError {
        RobotError::Faulted {
            reason: self
                .fault_reason
                .clone()
                .unwrap_or_else(|| "unknown fault".into()),
        }
    }

    /// 采样线程自行故障退出时，回收主臂链路并升级为 `Faulted`
    fn poll_sampler(&mut self) {
        let faulted = self
            .sampler
            .as_ref()
            .is_some_and(|handle| handle.status().is_faulted());
        if faulted {
            warn!("Leader sampler faulted; escalating");
            if let Err(e) = self.stop() {
                warn!("Failed to reclaim leader link: {}", e);
            }
        }
    }

    /// 统计连续失败并按策略升级
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.consecutive_failures = 0;
                Ok(value)
            },
            Err(e) => {
                self.consecutive_failures += 1;
                let limit = self.config.fault_policy.max_consecutive_failures;
                warn!(
                    "Follower I/O failure ({}/{}): {}",
                    self.consecutive_failures, limit, e
                );
                if self.consecutive_failures >= limit {
                    error!(
                        "{} consecutive follower failures; entering Faulted",
                        self.consecutive_failures
                    );
                    if let Err(stop_err) = self.stop() {
                        warn!("Sampler stop after fault: {}", stop_err);
                    }
                    return Err(self.escalate(e));
                }
                Err(e)
            },
        }
    }

    /// 进入 `Faulted`，记录原因并原样返回错误
    fn escalate(&mut self, err: RobotError) -> RobotError {
        error!("Teleoperation bridge faulted: {}", err);
        self.state = BridgeState::Faulted;
        self.fault_reason = Some(err.to_string());
        err
    }
}

impl<L, I, F, D> Drop for TeleopBridge<L, I, F, D>
where
    L: ArmLink + 'static,
    I: IntentSource,
    F: ArmLink,
    D: DiscreteActuator,
{
    fn drop(&mut self) {
        if let Some(handle) = self.sampler.take() {
            let timeout = self.config.sampler.join_timeout;
            if handle.stop(timeout).is_err() {
                warn!("Sampler did not stop within {:?} during drop", timeout);
            }
        }
    }
}

/// 平移增量的欧氏范数是否超过阈值
pub fn is_intervention(delta: &PoseDelta, threshold: f64) -> bool {
    delta.translation_norm() > threshold
}
