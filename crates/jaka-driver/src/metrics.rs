//! 采样线程指标
//!
//! 原子计数器，采样线程更新，任意线程读取快照，不引入锁。

use std::sync::atomic::{AtomicU64, Ordering};

/// 采样线程实时指标
#[derive(Debug, Default)]
pub struct SamplerMetrics {
    /// 成功采样次数
    pub samples_total: AtomicU64,
    /// 读取失败次数（包括重试中的失败）
    pub read_failures: AtomicU64,
    /// 单次迭代超过采样周期的次数
    pub overruns: AtomicU64,
    /// 已发布的增量数（包括失败时发布的零增量）
    pub published_total: AtomicU64,
}

impl SamplerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SamplerMetricsSnapshot {
        SamplerMetricsSnapshot {
            samples_total: self.samples_total.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            published_total: self.published_total.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.samples_total.store(0, Ordering::Relaxed);
        self.read_failures.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.published_total.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerMetricsSnapshot {
    pub samples_total: u64,
    pub read_failures: u64,
    pub overruns: u64,
    pub published_total: u64,
}

impl SamplerMetricsSnapshot {
    /// 读取失败率（百分比），无读取时为 0.0
    pub fn failure_rate(&self) -> f64 {
        let attempts = self.samples_total + self.read_failures;
        if attempts == 0 {
            return 0.0;
        }
        (self.read_failures as f64 / attempts as f64) * 100.0
    }
}
