//! 采样线程状态
//!
//! 采样线程写，控制线程读；使用原子变量共享。

use std::sync::atomic::{AtomicU8, Ordering};

/// 采样线程运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SamplerStatus {
    /// 已创建，尚未进入循环
    #[default]
    Idle = 0,
    Running = 1,
    /// 收到停止信号后正常退出
    Stopped = 2,
    /// 连续读取失败超过重试上限后退出
    Faulted = 3,
}

impl SamplerStatus {
    /// 无效值视为 `Faulted`
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopped,
            _ => Self::Faulted,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    pub fn is_faulted(self) -> bool {
        self == Self::Faulted
    }
}

/// 原子版本的 [`SamplerStatus`]
#[derive(Debug, Default)]
pub struct AtomicSamplerStatus {
    inner: AtomicU8,
}

impl AtomicSamplerStatus {
    pub fn new(status: SamplerStatus) -> Self {
        Self {
            inner: AtomicU8::new(status.as_u8()),
        }
    }

    pub fn get(&self) -> SamplerStatus {
        SamplerStatus::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, status: SamplerStatus) {
        self.inner.store(status.as_u8(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SamplerStatus::Idle,
            SamplerStatus::Running,
            SamplerStatus::Stopped,
            SamplerStatus::Faulted,
        ] {
            assert_eq!(SamplerStatus::from_u8(status.as_u8()), status);
        }
        assert_eq!(SamplerStatus::from_u8(200), SamplerStatus::Faulted);
    }

    #[test]
    fn test_atomic_status() {
        let status = AtomicSamplerStatus::default();
        assert_eq!(status.get(), SamplerStatus::Idle);
        status.set(SamplerStatus::Running);
        assert!(status.get().is_running());
        status.set(SamplerStatus::Faulted);
        assert!(status.get().is_faulted());
    }
}
