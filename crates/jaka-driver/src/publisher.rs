//! 最新增量发布槽
//!
//! 单写多读、覆盖式的单槽交换：采样线程 `publish`，控制循环随时 `latest`。
//! 内部是一个 `ArcSwap` 指针替换，读者永远不会看到半写入的值，也不会阻塞写者。

use arc_swap::ArcSwap;
use jaka_protocol::PoseDelta;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 一次发布的快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaSample {
    /// 发布序号（从未发布时为 0，第 N 次发布后为 N）
    pub seq: u64,
    pub delta: PoseDelta,
    /// 发布时刻（从未发布时为 `None`）
    pub published_at: Option<Instant>,
}

impl DeltaSample {
    pub const EMPTY: DeltaSample = DeltaSample {
        seq: 0,
        delta: PoseDelta::ZERO,
        published_at: None,
    };

    /// 距发布时刻的时长，用于判断数据是否陈旧
    pub fn age(&self) -> Option<Duration> {
        self.published_at.map(|t| t.elapsed())
    }
}

impl Default for DeltaSample {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// 最新位姿增量发布器
///
/// # 示例
///
/// ```rust
/// use jaka_driver::DeltaPublisher;
/// use jaka_protocol::PoseDelta;
///
/// let publisher = DeltaPublisher::new();
/// assert!(publisher.latest().is_zero());
///
/// publisher.publish(PoseDelta::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
/// assert_eq!(publisher.latest().as_array()[0], 1.0);
/// assert_eq!(publisher.latest_sample().seq, 1);
/// ```
#[derive(Debug)]
pub struct DeltaPublisher {
    slot: ArcSwap<DeltaSample>,
}

impl DeltaPublisher {
    pub fn new() -> Self {
        Self {
            slot: ArcSwap::from_pointee(DeltaSample::EMPTY),
        }
    }

    /// 覆盖发布最新增量
    ///
    /// 只允许一个写者（采样线程），序号由写者自己递增。
    pub fn publish(&self, delta: PoseDelta) {
        let seq = self.slot.load().seq + 1;
        self.slot.store(Arc::new(DeltaSample {
            seq,
            delta,
            published_at: Some(Instant::now()),
        }));
    }

    /// 最近一次发布的增量；从未发布时为零增量
    pub fn latest(&self) -> PoseDelta {
        self.slot.load().delta
    }

    pub fn latest_sample(&self) -> DeltaSample {
        **self.slot.load()
    }

    /// 清空槽位（采样器重启时调用）
    pub fn reset(&self) {
        self.slot.store(Arc::new(DeltaSample::EMPTY));
    }
}

impl Default for DeltaPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn uniform(v: f64) -> PoseDelta {
        PoseDelta::new([v; 6])
    }

    #[test]
    fn test_latest_is_zero_before_publish() {
        let publisher = DeltaPublisher::new();
        assert_eq!(publisher.latest(), PoseDelta::ZERO);
        let sample = publisher.latest_sample();
        assert_eq!(sample.seq, 0);
        assert!(sample.published_at.is_none());
        assert!(sample.age().is_none());
    }

    #[test]
    fn test_latest_returns_last_published() {
        let publisher = DeltaPublisher::new();
        for i in 1..=5 {
            publisher.publish(uniform(i as f64));
        }
        assert_eq!(publisher.latest(), uniform(5.0));
        assert_eq!(publisher.latest_sample().seq, 5);
    }

    #[test]
    fn test_reset_clears_slot() {
        let publisher = DeltaPublisher::new();
        publisher.publish(uniform(1.0));
        publisher.reset();
        assert_eq!(publisher.latest_sample(), DeltaSample::EMPTY);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_values() {
        let publisher = Arc::new(DeltaPublisher::new());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let publisher = publisher.clone();
                thread::spawn(move || {
                    let mut last_seq = 0;
                    for _ in 0..10_000 {
                        let sample = publisher.latest_sample();
                        let first = sample.delta.as_array()[0];
                        assert!(sample.delta.as_array().iter().all(|v| *v == first));
                        assert!(sample.seq >= last_seq, "sequence went backwards");
                        last_seq = sample.seq;
                    }
                })
            })
            .collect();

        for i in 1..=10_000 {
            publisher.publish(uniform(i as f64));
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(publisher.latest_sample().seq, 10_000);
    }
}
