//! 循环频率监控
//!
//! 按名称记录每个循环的 tick 时间戳，在滑动时间窗口内计算频率（Hz）。
//! 过期样本在该名称下次 tick 时惰性清理。

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::info;

/// 采样循环名称
pub const SAMPLER_LOOP: &str = "sampler";
/// 控制循环名称
pub const CONTROL_LOOP: &str = "control";

/// 默认统计窗口
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2);

/// 多循环频率监控器（线程安全）
///
/// # 示例
///
/// ```rust
/// use jaka_driver::FrequencyMonitor;
/// use std::time::{Duration, Instant};
///
/// let monitor = FrequencyMonitor::default();
/// let t0 = Instant::now();
/// monitor.tick_at("control", t0);
/// monitor.tick_at("control", t0 + Duration::from_millis(500));
/// monitor.tick_at("control", t0 + Duration::from_secs(1));
/// assert!((monitor.frequency("control") - 2.0).abs() < 1e-9);
/// ```
#[derive(Debug)]
pub struct FrequencyMonitor {
    window: Duration,
    samples: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl FrequencyMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn tick(&self, name: &str) {
        self.tick_at(name, Instant::now());
    }

    /// 以指定时刻记录一次 tick
    pub fn tick_at(&self, name: &str, now: Instant) {
        let mut samples = self.samples.lock();
        let queue = samples.entry(name.to_owned()).or_default();
        queue.push_back(now);

        // 进程启动后不足一个窗口时 checked_sub 可能为 None，此时无需清理
        if let Some(cutoff) = now.checked_sub(self.window) {
            while queue.front().is_some_and(|t| *t < cutoff) {
                queue.pop_front();
            }
        }
    }

    /// 窗口内频率：`(n - 1) / (last - first)`
    ///
    /// 样本少于 2 个或时间跨度为 0 时返回 0.0。
    pub fn frequency(&self, name: &str) -> f64 {
        let samples = self.samples.lock();
        samples.get(name).map_or(0.0, rate)
    }

    pub fn all_frequencies(&self) -> BTreeMap<String, f64> {
        let samples = self.samples.lock();
        samples
            .iter()
            .map(|(name, queue)| (name.clone(), rate(queue)))
            .collect()
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }

    /// 输出一行汇总日志
    pub fn log_summary(&self) {
        let rates = self.all_frequencies();
        if rates.is_empty() {
            return;
        }
        let summary = rates
            .iter()
            .map(|(name, hz)| format!("{}={:.1} Hz", name, hz))
            .collect::<Vec<_>>()
            .join(", ");
        info!("Loop rates: {}", summary);
    }
}

impl Default for FrequencyMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

fn rate(queue: &VecDeque<Instant>) -> f64 {
    let (Some(first), Some(last)) = (queue.front(), queue.back()) else {
        return 0.0;
    };
    if queue.len() < 2 {
        return 0.0;
    }
    let span = last.duration_since(*first).as_secs_f64();
    if span <= 0.0 {
        return 0.0;
    }
    (queue.len() - 1) as f64 / span
}
