//! # Jaka Tools - 应用层共享配置
//!
//! **依赖原则**: 只提供纯数据和转换，不打开任何链路
//!
//! ## 包含模块
//!
//! - `config` - TOML 配置文件（`TeleopConfig`）及到各层配置结构的转换
//!
//! ## 使用示例
//!
//! ```no_run
//! use jaka_tools::TeleopConfig;
//!
//! let config = TeleopConfig::load_from_file("teleop.toml")?;
//! let bridge_config = config.bridge_config();
//! # Ok::<(), jaka_tools::ConfigError>(())
//! ```

pub mod config;

pub use config::{
    ActuatorSettings, ArmSettings, ConfigError, ControlMode, ControlSettings, FollowerSettings,
    MonitorSettings, SamplerSettings, TeleopConfig,
};
