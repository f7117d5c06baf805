//! # 遥操作配置
//!
//! TOML 配置文件，所有字段都有默认值（经验调参值），文件中只需写出要覆盖的项。
//!
//! ```toml
//! [actuator]
//! host = "192.168.1.8"
//! coil = 8
//!
//! [sampler]
//! interval_ms = 50
//!
//! [control]
//! intervention_threshold = 1e-5
//! ```

use jaka_client::{
    BridgeConfig, ControlLoopConfig, FaultPolicy, FollowerConfig, StepCounts, StepMode,
};
use jaka_driver::{FrequencyMonitor, RetryPolicy, SamplerConfig};
use jaka_link::ModbusTcpConfig;
use jaka_protocol::{CoilAddress, MoveMode, RotationConvention};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 完整遥操作配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TeleopConfig {
    pub leader: ArmSettings,
    pub follower: FollowerSettings,
    pub actuator: ActuatorSettings,
    pub sampler: SamplerSettings,
    pub control: ControlSettings,
    pub monitor: MonitorSettings,
}

/// 主臂连接
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArmSettings {
    /// 控制器地址；仅供厂商 `ArmLink` 实现使用，内置的仿真链路不读取
    pub host: String,
}

impl Default for ArmSettings {
    fn default() -> Self {
        Self {
            host: "192.168.1.3".to_string(),
        }
    }
}

/// 从臂连接与运动参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FollowerSettings {
    /// 控制器地址；仅供厂商 `ArmLink` 实现使用，内置的仿真链路不读取
    pub host: String,
    pub robot_index: u8,
    /// 录制模式插补步数
    pub record_steps: u32,
    /// 点动模式插补步数
    pub jog_steps: u32,
    /// 关节目标插补步数
    pub joint_steps: u32,
    pub move_mode: MoveMode,
    pub joint_move_mode: MoveMode,
}

impl Default for FollowerSettings {
    fn default() -> Self {
        let follower = FollowerConfig::default();
        Self {
            host: "192.168.1.5".to_string(),
            robot_index: follower.robot_index,
            record_steps: follower.steps.record,
            jog_steps: follower.steps.jog,
            joint_steps: follower.steps.joint,
            move_mode: follower.move_mode,
            joint_move_mode: follower.joint_move_mode,
        }
    }
}

/// 吸盘（Modbus-TCP 线圈）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActuatorSettings {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub coil: u16,
    pub timeout_ms: u64,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        let modbus = ModbusTcpConfig::default();
        Self {
            host: modbus.host,
            port: modbus.port,
            unit_id: modbus.unit_id,
            coil: FollowerConfig::default().coil.value(),
            timeout_ms: modbus.timeout.as_millis() as u64,
        }
    }
}

/// 主臂采样线程
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerSettings {
    pub interval_ms: u64,
    pub convention: RotationConvention,
    /// 连续读取失败上限
    pub max_consecutive_failures: u32,
    pub backoff_ms: u64,
    pub join_timeout_ms: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        let sampler = SamplerConfig::default();
        Self {
            interval_ms: sampler.interval.as_millis() as u64,
            convention: sampler.convention,
            max_consecutive_failures: sampler.retry.max_consecutive_failures,
            backoff_ms: sampler.retry.backoff.as_millis() as u64,
            join_timeout_ms: sampler.join_timeout.as_millis() as u64,
        }
    }
}

/// 控制循环档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    #[default]
    Record,
    Jog,
}

impl From<ControlMode> for StepMode {
    fn from(mode: ControlMode) -> Self {
        match mode {
            ControlMode::Record => StepMode::Record,
            ControlMode::Jog => StepMode::Jog,
        }
    }
}

/// 控制循环与故障策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlSettings {
    pub period_ms: u64,
    pub mode: ControlMode,
    pub intervention_threshold: f64,
    /// 连续 apply 失败上限
    pub max_consecutive_failures: u32,
    /// 频率汇总日志间隔，0 表示关闭
    pub summary_interval_ms: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        let bridge = BridgeConfig::default();
        let control = ControlLoopConfig::default();
        Self {
            period_ms: control.period.as_millis() as u64,
            mode: ControlMode::default(),
            intervention_threshold: bridge.intervention_threshold,
            max_consecutive_failures: bridge.fault_policy.max_consecutive_failures,
            summary_interval_ms: control
                .summary_interval
                .map_or(0, |interval| interval.as_millis() as u64),
        }
    }
}

/// 频率监控
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSettings {
    pub window_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            window_ms: jaka_driver::DEFAULT_WINDOW.as_millis() as u64,
        }
    }
}

impl TeleopConfig {
    /// 从 TOML 文件加载并校验
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// 解析 TOML 字符串并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("sampler.interval_ms", self.sampler.interval_ms),
            ("sampler.join_timeout_ms", self.sampler.join_timeout_ms),
            ("control.period_ms", self.control.period_ms),
            ("monitor.window_ms", self.monitor.window_ms),
            ("actuator.timeout_ms", self.actuator.timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        if self.actuator.host.trim().is_empty() {
            return Err(ConfigError::Invalid("actuator.host must not be empty".into()));
        }
        if self.actuator.port == 0 {
            return Err(ConfigError::Invalid("actuator.port must not be 0".into()));
        }
        self.bridge_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(self.sampler.interval_ms),
            convention: self.sampler.convention,
            retry: RetryPolicy {
                max_consecutive_failures: self.sampler.max_consecutive_failures,
                backoff: Duration::from_millis(self.sampler.backoff_ms),
            },
            join_timeout: Duration::from_millis(self.sampler.join_timeout_ms),
        }
    }

    pub fn follower_config(&self) -> FollowerConfig {
        let follower = &self.follower;
        FollowerConfig {
            steps: StepCounts {
                record: follower.record_steps,
                jog: follower.jog_steps,
                joint: follower.joint_steps,
            },
            move_mode: follower.move_mode,
            joint_move_mode: follower.joint_move_mode,
            robot_index: follower.robot_index,
            coil: CoilAddress(self.actuator.coil),
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            sampler: self.sampler_config(),
            follower: self.follower_config(),
            intervention_threshold: self.control.intervention_threshold,
            fault_policy: FaultPolicy {
                max_consecutive_failures: self.control.max_consecutive_failures,
            },
        }
    }

    pub fn actuator_config(&self) -> ModbusTcpConfig {
        ModbusTcpConfig {
            host: self.actuator.host.clone(),
            port: self.actuator.port,
            unit_id: self.actuator.unit_id,
            timeout: Duration::from_millis(self.actuator.timeout_ms),
        }
    }

    pub fn control_loop_config(&self) -> ControlLoopConfig {
        ControlLoopConfig {
            period: Duration::from_millis(self.control.period_ms),
            mode: self.control.mode.into(),
            summary_interval: (self.control.summary_interval_ms > 0)
                .then(|| Duration::from_millis(self.control.summary_interval_ms)),
        }
    }

    pub fn frequency_monitor(&self) -> FrequencyMonitor {
        FrequencyMonitor::new(Duration::from_millis(self.monitor.window_ms))
    }
}
