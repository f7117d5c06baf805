//! 命令共用的辅助函数

use anyhow::{Context, Result};
use jaka_tools::TeleopConfig;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::info;

/// 加载配置文件；未指定时使用默认配置
pub fn load_config(path: Option<&Path>) -> Result<TeleopConfig> {
    match path {
        Some(path) => TeleopConfig::load_from_file(path)
            .with_context(|| format!("加载配置文件失败: {}", path.display())),
        None => Ok(TeleopConfig::default()),
    }
}

/// 创建停止标志：Ctrl+C 置位；`duration` 非零时到时自动置位
pub fn stop_flag(duration: Duration) -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));

    let on_signal = stop.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal. Stopping...");
        on_signal.store(true, Ordering::Release);
    })
    .context("设置 Ctrl+C 处理器失败")?;

    if !duration.is_zero() {
        let on_timer = stop.clone();
        thread::Builder::new()
            .name("jaka-cli-timer".into())
            .spawn(move || {
                thread::sleep(duration);
                info!("Run duration {:?} reached", duration);
                on_timer.store(true, Ordering::Release);
            })
            .context("启动计时线程失败")?;
    }

    Ok(stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_without_path() {
        assert_eq!(load_config(None).unwrap(), TeleopConfig::default());
    }

    #[test]
    fn test_load_config_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sampler]\ninterval_ms = 0").unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("interval_ms"));
    }
}
