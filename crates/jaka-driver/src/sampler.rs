//! 主臂位姿采样线程
//!
//! 独立线程按固定周期读取主臂笛卡尔位姿，计算相邻两帧的增量并发布到
//! [`DeltaPublisher`]。
//!
//! - 采样线程在运行期间独占主臂链路，退出时通过 [`SamplerExit`] 归还
//! - 睡眠可被停止信号打断（`crossbeam_channel` 的 `recv_deadline`）
//! - 读取失败按 [`RetryPolicy`] 有限重试，超过上限后线程退出并标记 `Faulted`
//! - 使用绝对截止时间调度；单次迭代超时后重新以当前时刻为基准，不追赶

use crate::error::DriverError;
use crate::hooks::{DeltaCallback, HookManager};
use crate::metrics::{SamplerMetrics, SamplerMetricsSnapshot};
use crate::monitor::{FrequencyMonitor, SAMPLER_LOOP};
use crate::publisher::DeltaPublisher;
use crate::status::{AtomicSamplerStatus, SamplerStatus};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use jaka_link::{ArmLink, LinkError};
use jaka_protocol::{Pose, PoseDelta, RotationConvention};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 默认采样周期（20 Hz）
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// 默认等待采样线程退出的超时
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 读取失败的重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 连续失败次数上限，达到后采样线程退出
    pub max_consecutive_failures: u32,
    /// 首次重试前的退避时间，之后每次翻倍
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// 第 `failures` 次连续失败后的退避时间（指数增长，不超过 `cap`）
    pub fn backoff_for(&self, failures: u32, cap: Duration) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1 << shift).min(cap)
    }
}

/// 采样线程配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    /// 采样周期
    pub interval: Duration,
    /// 旋转分量符号约定
    pub convention: RotationConvention,
    pub retry: RetryPolicy,
    /// `stop()` 等待线程退出的超时
    pub join_timeout: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            convention: RotationConvention::default(),
            retry: RetryPolicy::default(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// 增量计算状态（基准位姿）
///
/// 第一次采样时基准与当前值来自同一次读取，增量为零。
#[derive(Debug, Clone)]
pub struct DeltaTracker {
    convention: RotationConvention,
    baseline: Option<Pose>,
}

impl DeltaTracker {
    pub fn new(convention: RotationConvention) -> Self {
        Self {
            convention,
            baseline: None,
        }
    }

    /// 用新的位姿计算增量，并把它设为新的基准
    pub fn update(&mut self, current: Pose) -> PoseDelta {
        let delta = match &self.baseline {
            Some(previous) => PoseDelta::between(previous, &current, self.convention),
            None => PoseDelta::ZERO,
        };
        self.baseline = Some(current);
        delta
    }

    pub fn baseline(&self) -> Option<Pose> {
        self.baseline
    }

    pub fn reset(&mut self) {
        self.baseline = None;
    }
}

/// 单次采样：读取位姿并计算增量
///
/// 读取失败时基准保持不变，下一次成功读取会包含期间的全部位移。
pub fn sample_once<L: ArmLink + ?Sized>(
    link: &mut L,
    tracker: &mut DeltaTracker,
) -> Result<PoseDelta, LinkError> {
    let pose = link.read_cartesian_pose()?;
    Ok(tracker.update(pose))
}

/// 采样线程退出原因
#[derive(Debug)]
pub enum SamplerExitReason {
    /// 收到停止信号
    Stopped,
    /// 连续读取失败超过上限
    Faulted(DriverError),
}

/// 采样线程退出结果，归还主臂链路
pub struct SamplerExit<L> {
    pub link: L,
    pub reason: SamplerExitReason,
}

impl<L> fmt::Debug for SamplerExit<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplerExit")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// 采样器（构建后调用 [`spawn`](Self::spawn) 启动线程）
///
/// # 示例
///
/// ```rust,no_run
/// use jaka_driver::{DeltaPublisher, PoseSampler, SamplerConfig};
/// use jaka_link::{ArmLink, SimulatedArm};
/// use std::sync::Arc;
///
/// let publisher = Arc::new(DeltaPublisher::new());
/// let mut leader = SimulatedArm::new("leader");
/// leader.connect().unwrap();
///
/// let handle = PoseSampler::new(SamplerConfig::default(), publisher.clone())
///     .spawn(leader)
///     .unwrap();
/// // ... 控制循环读取 publisher.latest() ...
/// let exit = handle.stop(std::time::Duration::from_secs(2)).unwrap();
/// let _leader = exit.link;
/// ```
pub struct PoseSampler {
    config: SamplerConfig,
    publisher: Arc<DeltaPublisher>,
    monitor: Option<Arc<FrequencyMonitor>>,
    metrics: Arc<SamplerMetrics>,
    hooks: HookManager,
}

impl PoseSampler {
    pub fn new(config: SamplerConfig, publisher: Arc<DeltaPublisher>) -> Self {
        Self {
            config,
            publisher,
            monitor: None,
            metrics: Arc::new(SamplerMetrics::new()),
            hooks: HookManager::new(),
        }
    }

    /// 每次成功采样时 tick `"sampler"` 循环
    pub fn with_monitor(mut self, monitor: Arc<FrequencyMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// 使用外部共享的指标（便于跨多次启动累计）
    pub fn with_metrics(mut self, metrics: Arc<SamplerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn DeltaCallback>) -> Self {
        self.hooks.add_callback(callback);
        self
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// 启动采样线程，主臂链路的所有权移交给线程
    ///
    /// 链路必须已连接。线程创建失败时链路随错误一起被丢弃。
    pub fn spawn<L: ArmLink + 'static>(self, link: L) -> Result<SamplerHandle<L>, DriverError> {
        let (stop_tx, stop_rx) = bounded(1);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let status = Arc::new(AtomicSamplerStatus::new(SamplerStatus::Idle));
        let metrics = self.metrics.clone();

        let worker = SamplerLoop {
            config: self.config,
            publisher: self.publisher,
            monitor: self.monitor,
            metrics: self.metrics,
            hooks: self.hooks,
            status: status.clone(),
            stop_flag: stop_flag.clone(),
            stop_rx,
        };

        let thread = thread::Builder::new()
            .name("jaka-sampler".into())
            .spawn(move || worker.run(link))
            .map_err(DriverError::Spawn)?;

        info!(
            "Pose sampler started (interval={:?}, convention={:?})",
            self.config.interval, self.config.convention
        );

        Ok(SamplerHandle {
            stop_tx,
            stop_flag,
            status,
            metrics,
            joiner: Some(Joiner::Thread(thread)),
            join_timeout: self.config.join_timeout,
        })
    }
}

/// 线程内状态
struct SamplerLoop {
    config: SamplerConfig,
    publisher: Arc<DeltaPublisher>,
    monitor: Option<Arc<FrequencyMonitor>>,
    metrics: Arc<SamplerMetrics>,
    hooks: HookManager,
    status: Arc<AtomicSamplerStatus>,
    stop_flag: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
}

impl SamplerLoop {
    fn run<L: ArmLink>(self, mut link: L) -> SamplerExit<L> {
        let interval = self.config.interval;
        let retry = self.config.retry;
        let mut tracker = DeltaTracker::new(self.config.convention);
        let mut failures = 0u32;
        let mut next_deadline = Instant::now();

        self.status.set(SamplerStatus::Running);

        let reason = loop {
            if self.stop_flag.load(Ordering::Acquire) {
                break SamplerExitReason::Stopped;
            }

            match sample_once(&mut link, &mut tracker) {
                Ok(delta) => {
                    if failures > 0 {
                        info!("Leader pose read recovered after {} failure(s)", failures);
                        failures = 0;
                    }
                    self.metrics.samples_total.fetch_add(1, Ordering::Relaxed);
                    if let Some(monitor) = &self.monitor {
                        monitor.tick(SAMPLER_LOOP);
                    }
                    trace!("Leader delta: {:?}", delta.as_array());
                    self.publish(delta);
                },
                Err(e) => {
                    failures += 1;
                    self.metrics.read_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Leader pose read failed ({}/{}): {}",
                        failures, retry.max_consecutive_failures, e
                    );
                    // 读取失败时发布零增量，避免控制循环重放陈旧的运动
                    self.publish(PoseDelta::ZERO);

                    if failures >= retry.max_consecutive_failures {
                        error!(
                            "Pose sampler giving up after {} consecutive failures",
                            failures
                        );
                        break SamplerExitReason::Faulted(DriverError::SamplerFaulted {
                            failures,
                            last_error: e.to_string(),
                        });
                    }

                    let backoff = retry.backoff_for(failures, interval);
                    if self.sleep_until(Instant::now() + backoff) {
                        break SamplerExitReason::Stopped;
                    }
                    next_deadline = Instant::now();
                    continue;
                },
            }

            next_deadline += interval;
            let now = Instant::now();
            if next_deadline <= now {
                self.metrics.overruns.fetch_add(1, Ordering::Relaxed);
                trace!(
                    "Sampler overrun by {:?}, re-anchoring",
                    now.duration_since(next_deadline)
                );
                next_deadline = now;
            }

            if self.sleep_until(next_deadline) {
                break SamplerExitReason::Stopped;
            }
        };

        match &reason {
            SamplerExitReason::Stopped => {
                self.status.set(SamplerStatus::Stopped);
                info!("Pose sampler stopped");
            },
            SamplerExitReason::Faulted(_) => self.status.set(SamplerStatus::Faulted),
        }
        SamplerExit { link, reason }
    }

    fn publish(&self, delta: PoseDelta) {
        self.publisher.publish(delta);
        self.metrics.published_total.fetch_add(1, Ordering::Relaxed);
        if !self.hooks.is_empty() {
            self.hooks.trigger_all(&self.publisher.latest_sample());
        }
    }

    /// 睡眠到截止时间；收到停止信号（或句柄已丢弃）时返回 `true`
    fn sleep_until(&self, deadline: Instant) -> bool {
        match self.stop_rx.recv_deadline(deadline) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => self.stop_flag.load(Ordering::Acquire),
        }
    }
}

type JoinResult<L> = thread::Result<SamplerExit<L>>;

enum Joiner<L> {
    Thread(JoinHandle<SamplerExit<L>>),
    /// 之前的等待已超时，看门狗线程仍在 join
    Watchdog(Receiver<JoinResult<L>>),
}

impl<L: Send + 'static> Joiner<L> {
    fn into_receiver(self) -> Receiver<JoinResult<L>> {
        match self {
            Joiner::Thread(thread) => {
                let (tx, rx) = bounded(1);
                thread::spawn(move || {
                    let _ = tx.send(thread.join());
                });
                rx
            },
            Joiner::Watchdog(rx) => rx,
        }
    }
}

/// 等待采样线程退出失败
pub enum JoinError<L: Send + 'static> {
    /// 超时：线程仍在运行（通常阻塞在链路读取中），句柄原样返回以便再次等待
    TimedOut(SamplerHandle<L>),
    /// 线程 panic，主臂链路已丢失
    Panicked,
}

impl<L: Send + 'static> fmt::Debug for JoinError<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::TimedOut(_) => f.write_str("TimedOut(..)"),
            JoinError::Panicked => f.write_str("Panicked"),
        }
    }
}

impl<L: Send + 'static> From<JoinError<L>> for DriverError {
    fn from(e: JoinError<L>) -> Self {
        match e {
            JoinError::TimedOut(_) => DriverError::Timeout,
            JoinError::Panicked => DriverError::ThreadPanicked,
        }
    }
}

/// 采样线程句柄
///
/// Drop 时发送停止信号并在 `join_timeout` 内等待线程退出。
pub struct SamplerHandle<L: Send + 'static> {
    stop_tx: Sender<()>,
    stop_flag: Arc<AtomicBool>,
    status: Arc<AtomicSamplerStatus>,
    metrics: Arc<SamplerMetrics>,
    joiner: Option<Joiner<L>>,
    join_timeout: Duration,
}

impl<L: Send + 'static> SamplerHandle<L> {
    pub fn status(&self) -> SamplerStatus {
        self.status.get()
    }

    pub fn metrics(&self) -> SamplerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 线程是否已经退出（正常停止或故障）
    pub fn is_finished(&self) -> bool {
        match &self.joiner {
            Some(Joiner::Thread(thread)) => thread.is_finished(),
            Some(Joiner::Watchdog(rx)) => !rx.is_empty(),
            None => true,
        }
    }

    /// 发送停止信号（不等待）
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        let _ = self.stop_tx.try_send(());
    }

    /// 在超时内等待线程退出，取回主臂链路
    pub fn join_timeout(mut self, timeout: Duration) -> Result<SamplerExit<L>, JoinError<L>> {
        let Some(joiner) = self.joiner.take() else {
            return Err(JoinError::Panicked);
        };
        let rx = joiner.into_receiver();
        match rx.recv_timeout(timeout) {
            Ok(Ok(exit)) => Ok(exit),
            Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => {
                error!("Pose sampler thread panicked");
                Err(JoinError::Panicked)
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!("Pose sampler did not exit within {:?}", timeout);
                self.joiner = Some(Joiner::Watchdog(rx));
                Err(JoinError::TimedOut(self))
            },
        }
    }

    /// 停止并等待线程退出
    pub fn stop(self, timeout: Duration) -> Result<SamplerExit<L>, JoinError<L>> {
        debug!("Stopping pose sampler");
        self.request_stop();
        self.join_timeout(timeout)
    }
}

impl<L: Send + 'static> Drop for SamplerHandle<L> {
    fn drop(&mut self) {
        self.request_stop();
        if let Some(Joiner::Thread(thread)) = self.joiner.take() {
            let rx = Joiner::Thread(thread).into_receiver();
            if rx.recv_timeout(self.join_timeout).is_err() {
                warn!(
                    "Pose sampler did not exit within {:?} during drop",
                    self.join_timeout
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::ChannelDeltaHook;
    use jaka_link::mock::{CallLog, LinkCall, MockArm};

    fn pose(values: [f64; 6]) -> Pose {
        Pose::new(values)
    }

    fn fast_config() -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(5),
            retry: RetryPolicy {
                max_consecutive_failures: 3,
                backoff: Duration::from_millis(1),
            },
            ..Default::default()
        }
    }

    fn connected_arm(log: &CallLog) -> MockArm {
        let mut arm = MockArm::new("leader", log.clone());
        arm.connect().unwrap();
        arm
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_tracker_first_delta_is_zero() {
        let mut tracker = DeltaTracker::new(RotationConvention::InvertRotation);
        assert_eq!(tracker.update(pose([3.0, 2.0, 1.0, 0.1, 0.2, 0.3])), PoseDelta::ZERO);

        let delta = tracker.update(pose([4.0, 2.0, 1.0, 0.1, 0.2, 0.5]));
        assert_eq!(delta.as_array()[0], 1.0);
        assert!((delta.as_array()[5] + 0.2).abs() < 1e-12);

        tracker.reset();
        assert!(tracker.baseline().is_none());
        assert_eq!(tracker.update(pose([9.0; 6])), PoseDelta::ZERO);
    }

    #[test]
    fn test_sample_once_keeps_baseline_on_failure() {
        let log = CallLog::new();
        let mut arm = connected_arm(&log).with_poses([
            pose([0.0; 6]),
            pose([2.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ]);
        let mut tracker = DeltaTracker::new(RotationConvention::InvertRotation);

        assert!(sample_once(&mut arm, &mut tracker).unwrap().is_zero());
        arm.fail_reads.set(true);
        assert!(sample_once(&mut arm, &mut tracker).is_err());
        assert_eq!(tracker.baseline(), Some(Pose::ZERO));
        arm.fail_reads.set(false);
        assert_eq!(sample_once(&mut arm, &mut tracker).unwrap().as_array()[0], 2.0);
    }

    #[test]
    fn test_backoff_doubles_and_is_capped() {
        let retry = RetryPolicy {
            max_consecutive_failures: 5,
            backoff: Duration::from_millis(10),
        };
        let cap = Duration::from_millis(50);
        assert_eq!(retry.backoff_for(1, cap), Duration::from_millis(10));
        assert_eq!(retry.backoff_for(2, cap), Duration::from_millis(20));
        assert_eq!(retry.backoff_for(3, cap), Duration::from_millis(40));
        assert_eq!(retry.backoff_for(4, cap), cap);
        assert_eq!(retry.backoff_for(u32::MAX, cap), cap);
    }

    #[test]
    fn test_sampler_publishes_delta_sequence() {
        let log = CallLog::new();
        let arm = connected_arm(&log).with_poses([
            pose([0.0; 6]),
            pose([1.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
            pose([1.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
        ]);
        let publisher = Arc::new(DeltaPublisher::new());
        let monitor = Arc::new(FrequencyMonitor::default());
        let (hook, rx) = ChannelDeltaHook::new(64);

        let handle = PoseSampler::new(fast_config(), publisher.clone())
            .with_monitor(monitor.clone())
            .with_callback(Arc::new(hook))
            .spawn(arm)
            .unwrap();

        let deltas: Vec<PoseDelta> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap().delta)
            .collect();
        assert_eq!(deltas[0], PoseDelta::ZERO);
        assert_eq!(deltas[1], PoseDelta::new([1.0, 0.0, 0.0, 0.0, 0.0, -1.0]));
        assert_eq!(deltas[2], PoseDelta::ZERO);

        let exit = handle.stop(Duration::from_secs(1)).unwrap();
        assert!(matches!(exit.reason, SamplerExitReason::Stopped));
        assert!(monitor.all_frequencies().contains_key(SAMPLER_LOOP));
        assert!(publisher.latest_sample().seq >= 3);
    }

    #[test]
    fn test_sampler_faults_after_retry_limit() {
        let log = CallLog::new();
        let arm = connected_arm(&log);
        arm.fail_reads.set(true);
        let publisher = Arc::new(DeltaPublisher::new());

        let handle = PoseSampler::new(fast_config(), publisher.clone())
            .spawn(arm)
            .unwrap();
        assert!(wait_for(|| handle.status().is_faulted()));
        assert_eq!(handle.metrics().read_failures, 3);
        assert_eq!(handle.metrics().samples_total, 0);

        let exit = handle.join_timeout(Duration::from_secs(1)).unwrap();
        match exit.reason {
            SamplerExitReason::Faulted(DriverError::SamplerFaulted { failures, .. }) => {
                assert_eq!(failures, 3)
            },
            other => panic!("unexpected exit reason: {:?}", other),
        }
        assert_eq!(publisher.latest(), PoseDelta::ZERO);
    }

    #[test]
    fn test_sampler_recovers_from_transient_failures() {
        let log = CallLog::new();
        let arm = connected_arm(&log);
        let fail_reads = arm.fail_reads.clone();
        fail_reads.set(true);

        let config = SamplerConfig {
            retry: RetryPolicy {
                max_consecutive_failures: 10_000,
                backoff: Duration::from_millis(1),
            },
            ..fast_config()
        };
        let handle = PoseSampler::new(config, Arc::new(DeltaPublisher::new()))
            .spawn(arm)
            .unwrap();

        assert!(wait_for(|| handle.metrics().read_failures >= 1));
        fail_reads.set(false);
        assert!(wait_for(|| handle.metrics().samples_total >= 2));
        assert!(handle.status().is_running());
        handle.stop(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_stop_interrupts_sleep() {
        let log = CallLog::new();
        let arm = connected_arm(&log);
        let publisher = Arc::new(DeltaPublisher::new());
        let config = SamplerConfig {
            interval: Duration::from_secs(30),
            ..Default::default()
        };

        let handle = PoseSampler::new(config, publisher.clone())
            .spawn(arm)
            .unwrap();
        assert!(wait_for(|| publisher.latest_sample().seq == 1));

        let started = Instant::now();
        let exit = handle.stop(Duration::from_secs(1)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(exit.reason, SamplerExitReason::Stopped));
        assert_eq!(log.count(|c| matches!(c, LinkCall::ReadCartesianPose(_))), 1);
    }

    #[test]
    fn test_join_timeout_returns_handle_while_read_blocks() {
        let log = CallLog::new();
        let arm = connected_arm(&log).with_read_delay(Duration::from_millis(300));

        let handle = PoseSampler::new(fast_config(), Arc::new(DeltaPublisher::new()))
            .spawn(arm)
            .unwrap();
        assert!(wait_for(|| log.count(|c| matches!(c, LinkCall::ReadCartesianPose(_))) == 1));

        let handle = match handle.stop(Duration::from_millis(10)) {
            Err(JoinError::TimedOut(handle)) => handle,
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        };
        assert!(!handle.is_finished());

        let exit = handle.join_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(exit.reason, SamplerExitReason::Stopped));
    }
}
