//! 日志模块
//!
//! 调用点统一使用 `tracing` 宏，本模块负责全局日志级别与订阅器安装：
//! - `init()` 安装 `tracing-subscriber` 的 fmt 输出，`RUST_LOG` 优先于配置级别
//! - `set_log_level()` 在运行期调整过滤级别

use core::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use spin::Once;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(usize)]
pub enum LogLevel {
    /// 错误级别
    Error = 0,
    /// 警告级别
    Warn = 1,
    /// 信息级别
    Info = 2,
    /// 调试级别
    Debug = 3,
    /// 跟踪级别
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    fn from_usize(value: usize) -> Self {
        match value {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl core::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// 全局日志级别，默认为Info
static GLOBAL_LOG_LEVEL: AtomicUsize = AtomicUsize::new(LogLevel::Info as usize);

/// 已安装订阅器的过滤器句柄
static FILTER_HANDLE: Once<reload::Handle<EnvFilter, Registry>> = Once::new();

/// 设置全局日志级别
///
/// 订阅器已安装时同步更新其过滤器。
pub fn set_log_level(level: LogLevel) {
    GLOBAL_LOG_LEVEL.store(level as usize, Ordering::Relaxed);
    if let Some(handle) = FILTER_HANDLE.get() {
        if let Err(e) = handle.reload(EnvFilter::new(level.as_str())) {
            tracing::warn!("failed to reload log filter: {}", e);
        }
    }
}

/// 获取全局日志级别
pub fn get_log_level() -> LogLevel {
    LogLevel::from_usize(GLOBAL_LOG_LEVEL.load(Ordering::Relaxed))
}

/// 安装全局订阅器
///
/// 可重复调用，只有第一次生效；进程中已有其他订阅器时保留原订阅器。
pub fn init(level: LogLevel) {
    GLOBAL_LOG_LEVEL.store(level as usize, Ordering::Relaxed);
    FILTER_HANDLE.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str()));
        let (filter, handle) = reload::Layer::new(filter);
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_thread_names(true))
            .try_init();
        if installed.is_err() {
            tracing::debug!("global subscriber already installed");
        }
        handle
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_log_level_setting() {
        set_log_level(LogLevel::Debug);
        assert_eq!(get_log_level(), LogLevel::Debug);

        set_log_level(LogLevel::Error);
        assert_eq!(get_log_level(), LogLevel::Error);

        set_log_level(LogLevel::Info);
        assert_eq!(get_log_level(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_comparison() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    #[serial]
    fn test_init_is_idempotent() {
        init(LogLevel::Info);
        init(LogLevel::Trace);
        assert_eq!(get_log_level(), LogLevel::Trace);
        set_log_level(LogLevel::Info);
        tracing::info!("logging initialised");
    }
}
