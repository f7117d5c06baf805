//! # Jaka Driver
//!
//! 主臂采样与状态同步层：
//! - [`PoseSampler`]：独立线程按固定周期读取主臂位姿并计算增量
//! - [`DeltaPublisher`]：覆盖式单槽发布（`ArcSwap`，读者无锁）
//! - [`FrequencyMonitor`]：按名称统计各循环频率
//! - 钩子系统：每次发布时触发的回调，用于录制或观测
//!
//! 控制循环与采样线程之间唯一的共享资源是发布槽。

mod error;
pub mod hooks;
pub mod metrics;
pub mod monitor;
pub mod publisher;
pub mod sampler;
pub mod status;

pub use error::DriverError;
pub use hooks::{ChannelDeltaHook, DeltaCallback, HookManager};
pub use metrics::{SamplerMetrics, SamplerMetricsSnapshot};
pub use monitor::{CONTROL_LOOP, DEFAULT_WINDOW, FrequencyMonitor, SAMPLER_LOOP};
pub use publisher::{DeltaPublisher, DeltaSample};
pub use sampler::{
    DEFAULT_JOIN_TIMEOUT, DEFAULT_POLL_INTERVAL, DeltaTracker, JoinError, PoseSampler,
    RetryPolicy, SamplerConfig, SamplerExit, SamplerExitReason, SamplerHandle, sample_once,
};
pub use status::{AtomicSamplerStatus, SamplerStatus};
