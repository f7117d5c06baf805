//! 配置管理命令

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use jaka_tools::TeleopConfig;
use std::path::{Path, PathBuf};

use crate::utils;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（TOML）
    Show,

    /// 校验配置文件
    Check,

    /// 写出默认配置文件
    Init {
        /// 输出路径
        path: PathBuf,

        /// 覆盖已存在的文件
        #[arg(short, long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(&self, path: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                let config = utils::load_config(path)?;
                print!("{}", config.to_toml_string()?);
                Ok(())
            },

            ConfigCommand::Check => {
                let Some(path) = path else {
                    bail!("未指定配置文件（使用 --config <PATH>）");
                };
                let config = utils::load_config(Some(path))?;
                println!("✅ 配置有效: {}", path.display());
                println!(
                    "  主臂 {}  从臂 {}  吸盘 {}:{} (coil {})",
                    config.leader.host,
                    config.follower.host,
                    config.actuator.host,
                    config.actuator.port,
                    config.actuator.coil
                );
                Ok(())
            },

            ConfigCommand::Init { path, force } => {
                init(path, *force)?;
                println!("✅ 已写入默认配置: {}", path.display());
                Ok(())
            },
        }
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} 已存在（使用 --force 覆盖）", path.display());
    }
    TeleopConfig::default()
        .save_to_file(path)
        .with_context(|| format!("写入 {} 失败", path.display()))
}
