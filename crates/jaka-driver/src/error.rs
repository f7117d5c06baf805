//! 驱动层错误类型定义

use jaka_link::LinkError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 链路错误
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 采样线程连续读取失败，超过重试上限后退出
    #[error("Sampler faulted after {failures} consecutive read failures: {last_error}")]
    SamplerFaulted { failures: u32, last_error: String },

    /// 采样线程创建失败
    #[error("Failed to spawn sampler thread: {0}")]
    Spawn(std::io::Error),

    /// 操作超时（例如等待采样线程退出）
    #[error("Operation timeout")]
    Timeout,

    /// 采样线程 panic
    #[error("Sampler thread panicked")]
    ThreadPanicked,
}
