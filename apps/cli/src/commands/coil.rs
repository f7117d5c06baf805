//! 吸盘线圈命令
//!
//! 直接通过 Modbus-TCP 读写单个线圈，不经过遥操作桥接器。

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use jaka_link::{DiscreteActuator, ModbusTcpActuator, ModbusTcpConfig};
use jaka_protocol::{ActuatorState, CoilAddress};
use jaka_tools::TeleopConfig;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoilValue {
    On,
    Off,
}

impl From<CoilValue> for ActuatorState {
    fn from(value: CoilValue) -> Self {
        match value {
            CoilValue::On => ActuatorState::On,
            CoilValue::Off => ActuatorState::Off,
        }
    }
}

/// 线圈命令
#[derive(Subcommand, Debug)]
pub enum CoilCommand {
    /// 读取线圈状态
    Read {
        /// 设备地址（覆盖配置）
        #[arg(long)]
        host: Option<String>,

        /// 线圈地址（覆盖配置）
        #[arg(long)]
        coil: Option<u16>,
    },

    /// 写入线圈状态
    Write {
        #[arg(value_enum)]
        value: CoilValue,

        /// 设备地址（覆盖配置）
        #[arg(long)]
        host: Option<String>,

        /// 线圈地址（覆盖配置）
        #[arg(long)]
        coil: Option<u16>,
    },
}

fn target(
    config: &TeleopConfig,
    host: Option<&str>,
    coil: Option<u16>,
) -> (ModbusTcpConfig, CoilAddress) {
    let mut modbus = config.actuator_config();
    if let Some(host) = host {
        modbus.host = host.to_string();
    }
    let coil = CoilAddress(coil.unwrap_or(config.actuator.coil));
    (modbus, coil)
}

impl CoilCommand {
    pub fn execute(&self, config: &TeleopConfig) -> Result<()> {
        match self {
            CoilCommand::Read { host, coil } => {
                let (modbus, coil) = target(config, host.as_deref(), *coil);
                let endpoint = modbus.endpoint();
                let mut actuator = ModbusTcpActuator::new(modbus);
                actuator.connect().with_context(|| format!("连接 {} 失败", endpoint))?;
                let state = actuator.read_state(coil);
                let _ = actuator.disconnect();
                let state = state.context("读取线圈失败")?;
                println!("coil {} = {:?}", coil.value(), state);
                Ok(())
            },

            CoilCommand::Write { value, host, coil } => {
                let (modbus, coil) = target(config, host.as_deref(), *coil);
                let endpoint = modbus.endpoint();
                let mut actuator = ModbusTcpActuator::new(modbus);
                actuator.connect().with_context(|| format!("连接 {} 失败", endpoint))?;
                let result = actuator.write_state(coil, (*value).into());
                let _ = actuator.disconnect();
                result.context("写入线圈失败")?;
                println!("✅ coil {} <- {:?}", coil.value(), value);
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_overrides() {
        let config = TeleopConfig::default();
        let (modbus, coil) = target(&config, None, None);
        assert_eq!(modbus.host, "192.168.1.8");
        assert_eq!(coil, CoilAddress(8));

        let (modbus, coil) = target(&config, Some("127.0.0.1"), Some(3));
        assert_eq!(modbus.endpoint(), "127.0.0.1:502");
        assert_eq!(coil, CoilAddress(3));
    }

    #[test]
    fn test_coil_value_conversion() {
        assert_eq!(ActuatorState::from(CoilValue::On), ActuatorState::On);
        assert_eq!(ActuatorState::from(CoilValue::Off), ActuatorState::Off);
    }
}
