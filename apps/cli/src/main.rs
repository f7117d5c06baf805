//! # Jaka CLI
//!
//! Command-line interface for Jaka leader-to-follower teleoperation.
//!
//! ```bash
//! # 仿真主从臂，真实吸盘，运行 30 秒
//! jaka-cli teleop --actuator modbus --duration 30
//!
//! # 直接读写吸盘线圈
//! jaka-cli coil write on
//! jaka-cli coil read
//!
//! # 查看/生成配置
//! jaka-cli --config teleop.toml config show
//! jaka-cli config init teleop.toml
//! ```
//!
//! 日志级别由 `RUST_LOG` 控制，默认 `info`。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod utils;

use commands::{CoilCommand, ConfigCommand, JogCommand, TeleopCommand};

/// Jaka CLI - 主从遥操作命令行工具
#[derive(Parser, Debug)]
#[command(name = "jaka-cli")]
#[command(
    about = "Command-line interface for Jaka leader-to-follower teleoperation",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// 配置文件（TOML），缺省使用内置默认值
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行主从遥操作
    Teleop {
        #[command(flatten)]
        args: TeleopCommand,
    },

    /// 键盘点动从臂（0 停止，1 正向，2 反向，q 退出）
    Jog {
        #[command(flatten)]
        args: JogCommand,
    },

    /// 吸盘线圈读写
    #[command(subcommand)]
    Coil(CoilCommand),

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let path = cli.config.as_deref();

    match cli.command {
        Commands::Teleop { args } => args.execute(&utils::load_config(path)?),
        Commands::Jog { args } => args.execute(&utils::load_config(path)?),
        Commands::Coil(cmd) => cmd.execute(&utils::load_config(path)?),
        Commands::Config(cmd) => cmd.execute(path),
    }
}

const DEFAULT_LOG_DIRECTIVES: &str =
    "jaka_cli=info,jaka_client=info,jaka_driver=info,jaka_link=info";

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_DIRECTIVES));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_teleop_with_global_config() {
        let cli =
            Cli::try_parse_from(["jaka-cli", "teleop", "--duration", "5", "-c", "teleop.toml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("teleop.toml")));
        assert!(matches!(cli.command, Commands::Teleop { .. }));
    }

    #[test]
    fn test_parse_coil_write() {
        let cli = Cli::try_parse_from(["jaka-cli", "coil", "write", "on", "--coil", "9"]).unwrap();
        assert!(matches!(cli.command, Commands::Coil(CoilCommand::Write { .. })));
    }
}
