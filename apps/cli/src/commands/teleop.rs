//! 遥操作命令
//!
//! 主臂和从臂使用仿真链路（厂商 SDK 不在本仓库内），吸盘可选仿真或 Modbus-TCP。

use crate::utils;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use jaka_client::{TeleopBridgeBuilder, ToggleIntent, run_control_loop};
use jaka_link::{DiscreteActuator, ModbusTcpActuator, SimulatedActuator, SimulatedArm};
use jaka_protocol::Pose;
use jaka_tools::{ControlMode, TeleopConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, trace};

/// 吸盘后端
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuatorBackend {
    /// 仿真线圈
    #[default]
    Sim,
    /// 配置文件中的 Modbus-TCP 设备
    Modbus,
}

/// 遥操作命令参数
#[derive(Args, Debug)]
pub struct TeleopCommand {
    /// 运行时长（秒），0 表示直到 Ctrl+C
    #[arg(short, long, default_value_t = 0)]
    pub duration: u64,

    /// 吸盘后端
    #[arg(short, long, value_enum, default_value_t = ActuatorBackend::Sim)]
    pub actuator: ActuatorBackend,

    /// 控制档位（覆盖配置）
    #[arg(short, long, value_enum)]
    pub mode: Option<ControlModeArg>,

    /// 控制周期（毫秒，覆盖配置）
    #[arg(long)]
    pub period_ms: Option<u64>,

    /// 主臂采样周期（毫秒，覆盖配置）
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// 仿真主臂 x 方向摆动幅度（mm）
    #[arg(long, default_value_t = 20.0)]
    pub amplitude: f64,

    /// 每隔多少秒切换一次吸盘意图，0 表示不切换
    #[arg(long, default_value_t = 0)]
    pub toggle_every: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlModeArg {
    Record,
    Jog,
}

impl From<ControlModeArg> for ControlMode {
    fn from(mode: ControlModeArg) -> Self {
        match mode {
            ControlModeArg::Record => ControlMode::Record,
            ControlModeArg::Jog => ControlMode::Jog,
        }
    }
}

impl TeleopCommand {
    /// 命令行参数覆盖配置文件
    fn effective_config(&self, config: &TeleopConfig) -> Result<TeleopConfig> {
        let mut config = config.clone();
        if let Some(mode) = self.mode {
            config.control.mode = mode.into();
        }
        if let Some(period) = self.period_ms {
            config.control.period_ms = period;
        }
        if let Some(interval) = self.interval_ms {
            config.sampler.interval_ms = interval;
        }
        config.validate().context("命令行参数无效")?;
        Ok(config)
    }

    pub fn execute(&self, config: &TeleopConfig) -> Result<()> {
        let config = self.effective_config(config)?;

        let amplitude = self.amplitude;
        let leader = SimulatedArm::with_motion("leader", move |t| {
            let x = (t.as_secs_f64() * 0.5).sin() * amplitude;
            Pose::new([x, 0.0, 0.0, 0.0, 0.0, 0.0])
        });
        let follower = SimulatedArm::new("follower");
        let follower_view = follower.handle();
        let actuator: Box<dyn DiscreteActuator> = match self.actuator {
            ActuatorBackend::Sim => Box::new(SimulatedActuator::new()),
            ActuatorBackend::Modbus => Box::new(ModbusTcpActuator::new(config.actuator_config())),
        };
        let intent = ToggleIntent::default();
        let monitor = Arc::new(config.frequency_monitor());

        let mut bridge = TeleopBridgeBuilder::new()
            .leader(leader)
            .follower_arm(follower)
            .actuator(actuator)
            .intent(intent.clone())
            .config(config.bridge_config())
            .monitor(monitor.clone())
            .build()?;

        let stop = utils::stop_flag(Duration::from_secs(self.duration))?;

        println!("🔌 连接主臂、从臂和吸盘...");
        bridge.connect().context("连接失败")?;
        bridge.start().context("启动采样线程失败")?;
        println!("✅ 遥操作运行中（Ctrl+C 停止）");

        let toggle_every = Duration::from_secs(self.toggle_every);
        let mut last_toggle = Instant::now();

        let result = run_control_loop(
            &mut bridge,
            &config.control_loop_config(),
            &stop,
            |record, events| {
                if !toggle_every.is_zero() && last_toggle.elapsed() >= toggle_every {
                    let state = intent.toggle();
                    info!("Actuator intent -> {:?}", state);
                    last_toggle = Instant::now();
                }
                trace!(intervention = events.is_intervention, "delta={:?}", record.delta);
            },
        );

        let metrics = bridge.sampler_metrics();
        bridge.disconnect().context("断开连接失败")?;
        let stats = result?;

        println!(
            "📊 控制循环: {} 次, 失败 {}, 超时 {}, 人工干预 {}",
            stats.iterations, stats.failed_steps, stats.overruns, stats.interventions
        );
        println!(
            "📊 采样线程: {} 次采样, 读取失败 {}",
            metrics.samples_total, metrics.read_failures
        );
        for (name, hz) in monitor.all_frequencies() {
            println!("  {:<8} {:>7.1} Hz", name, hz);
        }
        println!("🤖 从臂最终位姿: {:?}", follower_view.pose().as_array());
        Ok(())
    }
}
