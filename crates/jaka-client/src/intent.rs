//! 执行器意图来源
//!
//! 吸盘的期望状态由键盘/HID 等外部输入决定，桥接器每个 tick 读取一次。

use jaka_protocol::ActuatorState;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 执行器期望状态的来源
pub trait IntentSource: Send {
    fn current(&self) -> ActuatorState;
}

impl<T: IntentSource + ?Sized> IntentSource for Box<T> {
    fn current(&self) -> ActuatorState {
        (**self).current()
    }
}

/// 固定意图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedIntent(pub ActuatorState);

impl IntentSource for FixedIntent {
    fn current(&self) -> ActuatorState {
        self.0
    }
}

/// 可切换意图（按键翻转）
///
/// 克隆后共享同一状态：输入线程调用 `toggle()`，控制循环读取 `current()`。
///
/// ```rust
/// use jaka_client::{IntentSource, ToggleIntent};
/// use jaka_protocol::ActuatorState;
///
/// let intent = ToggleIntent::default();
/// let keyboard = intent.clone();
/// keyboard.toggle();
/// assert_eq!(intent.current(), ActuatorState::On);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ToggleIntent {
    on: Arc<AtomicBool>,
}

impl ToggleIntent {
    pub fn new(initial: ActuatorState) -> Self {
        Self {
            on: Arc::new(AtomicBool::new(initial.is_on())),
        }
    }

    /// 翻转并返回新状态
    pub fn toggle(&self) -> ActuatorState {
        let previous = self.on.fetch_xor(true, Ordering::AcqRel);
        ActuatorState::from(!previous)
    }

    pub fn set(&self, state: ActuatorState) {
        self.on.store(state.is_on(), Ordering::Release);
    }
}

impl IntentSource for ToggleIntent {
    fn current(&self) -> ActuatorState {
        ActuatorState::from(self.on.load(Ordering::Acquire))
    }
}
