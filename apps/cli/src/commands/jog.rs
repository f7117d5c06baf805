//! 键盘点动命令
//!
//! 从标准输入读取按键（回车提交）：`1` 沿 x 正向、`2` 沿 x 反向、`0` 停止、`q` 退出。
//! 最后一次按键持续生效，每个控制周期向从臂发送一次点动增量。

use crate::utils;
use anyhow::{Context, Result};
use clap::Args;
use jaka_client::{FixedIntent, StepMode, TeleopBridgeBuilder, TickPacer};
use jaka_link::{SimulatedActuator, SimulatedArm};
use jaka_protocol::{ActionRecord, PoseDelta};
use jaka_tools::TeleopConfig;
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 点动命令参数
#[derive(Args, Debug)]
pub struct JogCommand {
    /// 每个周期的 x 增量（mm）
    #[arg(short, long, default_value_t = 1.0)]
    pub speed: f64,

    /// 运行时长（秒），0 表示直到 `q` 或 Ctrl+C
    #[arg(short, long, default_value_t = 0)]
    pub duration: u64,
}

/// 按键对应的方向；其他按键返回 `None`
fn key_direction(key: char) -> Option<i8> {
    match key {
        '0' => Some(0),
        '1' => Some(1),
        '2' => Some(-1),
        _ => None,
    }
}

fn jog_delta(direction: i8, speed: f64) -> PoseDelta {
    PoseDelta::new([f64::from(direction) * speed, 0.0, 0.0, 0.0, 0.0, 0.0])
}

/// 后台读取标准输入，更新方向；读到 `q` 或 EOF 时置位停止标志
fn spawn_key_reader(direction: Arc<AtomicI8>, stop: Arc<AtomicBool>) -> Result<()> {
    thread::Builder::new()
        .name("jaka-cli-keys".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                for key in line.chars() {
                    if key == 'q' {
                        stop.store(true, Ordering::Release);
                        return;
                    }
                    if let Some(dir) = key_direction(key) {
                        direction.store(dir, Ordering::Release);
                    }
                }
            }
            stop.store(true, Ordering::Release);
        })
        .context("启动按键线程失败")?;
    Ok(())
}

impl JogCommand {
    pub fn execute(&self, config: &TeleopConfig) -> Result<()> {
        let follower = SimulatedArm::new("follower");
        let follower_view = follower.handle();
        let mut bridge = TeleopBridgeBuilder::new()
            .leader(SimulatedArm::new("leader"))
            .follower_arm(follower)
            .actuator(SimulatedActuator::new())
            .intent(FixedIntent::default())
            .config(config.bridge_config())
            .build()?;

        let stop = utils::stop_flag(Duration::from_secs(self.duration))?;
        let direction = Arc::new(AtomicI8::new(0));
        spawn_key_reader(direction.clone(), stop.clone())?;

        bridge.connect().context("连接失败")?;
        println!("🎮 点动模式：1 正向 / 2 反向 / 0 停止 / q 退出（按键后回车）");

        let mut pacer = TickPacer::new(Duration::from_millis(config.control.period_ms));
        let mut result = Ok(());
        while !stop.load(Ordering::Acquire) {
            let dir = direction.load(Ordering::Acquire);
            let record = ActionRecord::motion(jog_delta(dir, self.speed));
            match bridge.apply(&record, StepMode::Jog) {
                Ok(()) => debug!("jog {:?}", record.delta.as_array()),
                Err(e) if e.is_fatal() => {
                    result = Err(e);
                    break;
                },
                Err(e) => warn!("Jog step failed: {}", e),
            }

            if let Some(late) = pacer.wait() {
                trace!("Jog tick overrun by {:?}", late);
            }
        }

        bridge.disconnect().context("断开连接失败")?;
        result?;
        println!("🤖 从臂最终位姿: {:?}", follower_view.pose().as_array());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(key_direction('0'), Some(0));
        assert_eq!(key_direction('1'), Some(1));
        assert_eq!(key_direction('2'), Some(-1));
        assert_eq!(key_direction('x'), None);
    }

    #[test]
    fn test_jog_delta_moves_x_only() {
        assert_eq!(
            jog_delta(-1, 2.5),
            PoseDelta::new([-2.5, 0.0, 0.0, 0.0, 0.0, 0.0])
        );
        assert!(jog_delta(0, 2.5).is_zero());
    }
}
