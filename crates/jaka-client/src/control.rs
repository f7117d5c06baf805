//! 固定频率控制循环
//!
//! 以绝对时间锚点驱动 `bridge.step()`，使用 `spin_sleep` 获得亚毫秒级的睡眠精度。
//! 单次失败由桥接器的故障策略统计；一旦进入 `Faulted` 循环立即返回错误。

use crate::bridge::{TeleopBridge, TeleopEvents};
use crate::error::{FaultKind, Result};
use crate::follower::StepMode;
use crate::intent::IntentSource;
use jaka_link::{ArmLink, DiscreteActuator};
use jaka_protocol::ActionRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// 控制循环配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlLoopConfig {
    /// 控制周期（默认 10 ms，即 100 Hz）
    pub period: Duration,
    pub mode: StepMode,
    /// 频率汇总日志间隔；`None` 表示不输出
    pub summary_interval: Option<Duration>,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(10),
            mode: StepMode::Record,
            summary_interval: Some(Duration::from_secs(5)),
        }
    }
}

/// 控制循环统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlLoopStats {
    pub iterations: u64,
    pub failed_steps: u64,
    pub overruns: u64,
    pub interventions: u64,
}

/// 固定周期节拍器
///
/// 以绝对时间锚点计算下一拍；错过一拍时重新锚定到当前时刻，不追补。
#[derive(Debug, Clone)]
pub struct TickPacer {
    period: Duration,
    next_tick: Instant,
}

impl TickPacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_tick: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 睡到下一拍；本拍已超时则返回超出的时长
    pub fn wait(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let overrun = if self.next_tick > now {
            spin_sleep::sleep(self.next_tick - now);
            None
        } else {
            let late = now - self.next_tick;
            self.next_tick = now;
            Some(late)
        };
        self.next_tick += self.period;
        overrun
    }
}

/// 运行控制循环，直到 `stop` 被置位或桥接器进入故障状态
///
/// 每次成功的 step 之后调用 `on_step`（例如用于录制或显示）。
pub fn run_control_loop<L, I, F, D>(
    bridge: &mut TeleopBridge<L, I, F, D>,
    config: &ControlLoopConfig,
    stop: &AtomicBool,
    mut on_step: impl FnMut(&ActionRecord, &TeleopEvents),
) -> Result<ControlLoopStats>
where
    L: ArmLink + 'static,
    I: IntentSource,
    F: ArmLink,
    D: DiscreteActuator,
{
    let mut stats = ControlLoopStats::default();
    let mut pacer = TickPacer::new(config.period);
    let mut last_summary = Instant::now();
    info!("Control loop running at {:?} period", config.period);

    while !stop.load(Ordering::Acquire) {
        stats.iterations += 1;

        match bridge.step(config.mode) {
            Ok(record) => {
                let events = bridge.events_for(&record);
                if events.is_intervention {
                    stats.interventions += 1;
                }
                on_step(&record, &events);
            },
            Err(e) if e.is_fatal() || e.kind() == FaultKind::State => {
                info!("Control loop aborted after {} iterations", stats.iterations);
                return Err(e);
            },
            Err(e) => {
                stats.failed_steps += 1;
                debug!("Skipping control tick: {}", e);
            },
        }

        if let Some(interval) = config.summary_interval
            && last_summary.elapsed() >= interval
        {
            bridge.monitor().log_summary();
            last_summary = Instant::now();
        }

        if let Some(late) = pacer.wait() {
            stats.overruns += 1;
            trace!("Control loop overrun by {:?}", late);
        }
    }

    info!(
        "Control loop stopped after {} iterations ({} failed)",
        stats.iterations, stats.failed_steps
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_holds_period() {
        let period = Duration::from_millis(5);
        let started = Instant::now();
        let mut pacer = TickPacer::new(period);
        for _ in 0..4 {
            pacer.wait();
        }
        assert!(started.elapsed() >= period * 4);
    }

    #[test]
    fn test_pacer_reanchors_after_overrun() {
        let period = Duration::from_millis(5);
        let mut pacer = TickPacer::new(period);
        std::thread::sleep(Duration::from_millis(30));

        let late = pacer.wait().unwrap();
        assert!(late >= Duration::from_millis(20));

        // 不追补错过的拍子，下一拍仍等待一个完整周期
        let before = Instant::now();
        pacer.wait();
        assert!(before.elapsed() >= Duration::from_millis(3));
    }
}
