//! 增量回调（Hook）
//!
//! 采样线程每发布一次增量就触发一次回调，用于录制或测试观测。
//! 回调在采样线程上执行，必须非阻塞；推荐用 [`ChannelDeltaHook`] 把数据转交给其他线程。

use crate::publisher::DeltaSample;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 增量回调 Trait
pub trait DeltaCallback: Send + Sync {
    /// 每次发布后调用
    fn on_delta(&self, sample: &DeltaSample);
}

/// 回调列表
///
/// 在启动采样线程前配置，随后移交给采样线程，运行中不再修改。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn DeltaCallback>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback(&mut self, callback: Arc<dyn DeltaCallback>) {
        self.callbacks.push(callback);
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    pub fn trigger_all(&self, sample: &DeltaSample) {
        for callback in &self.callbacks {
            callback.on_delta(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// 基于有界 Channel 的回调
///
/// 队列满时丢弃并计数，不阻塞采样线程。
///
/// ```rust
/// use jaka_driver::hooks::{ChannelDeltaHook, DeltaCallback, HookManager};
/// use std::sync::Arc;
///
/// let (hook, rx) = ChannelDeltaHook::new(1024);
/// let dropped = hook.dropped().clone();
///
/// let mut hooks = HookManager::new();
/// hooks.add_callback(Arc::new(hook) as Arc<dyn DeltaCallback>);
/// # drop(rx);
/// # let _ = dropped;
/// ```
pub struct ChannelDeltaHook {
    tx: Sender<DeltaSample>,
    dropped: Arc<AtomicU64>,
}

impl ChannelDeltaHook {
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn new(capacity: usize) -> (Self, Receiver<DeltaSample>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// 丢弃计数（队列满或接收端已关闭）
    pub fn dropped(&self) -> &Arc<AtomicU64> {
        &self.dropped
    }
}

impl DeltaCallback for ChannelDeltaHook {
    fn on_delta(&self, sample: &DeltaSample) {
        if self.tx.try_send(*sample).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
