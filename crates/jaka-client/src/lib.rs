//! # Jaka Client
//!
//! 主从遥操作的用户接口：
//! - [`TeleopBridge`]：生命周期状态机，组合主臂采样线程与从臂驱动
//! - [`FollowerDriver`]：从臂运动转发与吸盘滞回
//! - [`IntentSource`]：执行器期望状态的来源（键盘、固定值）
//! - [`run_control_loop`]：固定频率的控制循环
//!
//! # 示例
//!
//! ```rust,no_run
//! use jaka_client::{FixedIntent, StepMode, TeleopBridgeBuilder};
//! use jaka_link::{ModbusTcpActuator, ModbusTcpConfig, SimulatedArm};
//!
//! # fn main() -> Result<(), jaka_client::RobotError> {
//! let mut bridge = TeleopBridgeBuilder::new()
//!     .leader(SimulatedArm::new("leader"))
//!     .follower_arm(SimulatedArm::new("follower"))
//!     .actuator(ModbusTcpActuator::new(ModbusTcpConfig::default()))
//!     .intent(FixedIntent::default())
//!     .build()?;
//!
//! bridge.connect()?;
//! bridge.start()?;
//! let record = bridge.step(StepMode::Record)?;
//! println!("delta={:?} intervention={}", record.delta, bridge.intervention());
//! bridge.disconnect()?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod builder;
pub mod control;
mod error;
pub mod follower;
pub mod intent;
pub mod state;

pub use bridge::{BridgeConfig, FaultPolicy, TeleopBridge, TeleopEvents, is_intervention};
pub use builder::TeleopBridgeBuilder;
pub use control::{ControlLoopConfig, ControlLoopStats, TickPacer, run_control_loop};
pub use error::{FaultKind, Result, RobotError};
pub use follower::{FollowerConfig, FollowerDriver, Observation, StepCounts, StepMode};
pub use intent::{FixedIntent, IntentSource, ToggleIntent};
pub use state::BridgeState;
