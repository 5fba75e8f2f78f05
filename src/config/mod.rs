//! # 仿真配置
//!
//! 编译期常量与运行期可调参数。
//!
//! 运行期参数 [`SimConfig`] 可以从 TOML 文件加载：
//!
//! ```toml
//! realtime_scale = 1.0
//! pin_logging = true
//! masked_timers = ["Temperature ISR"]
//! net_port = 8099
//! log_level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::error::{Result, SimError};
use crate::log::LogLevel;

// ============================================================================
// 编译期常量
// ============================================================================

/// 虚拟时钟频率 (100 MHz)
pub const TICK_FREQUENCY: u64 = 100_000_000;
/// 轮询步进，单位纳秒
pub const POLL_QUANTUM_NANOS: u64 = 100;
/// 迟到超过该值（纳秒）时输出警告
pub const LATE_WARNING_NANOS: u64 = 1_000_000;
/// GPIO 引脚数量
pub const PIN_COUNT: usize = 256;
/// 每个引脚的历史记录上限
pub const PIN_LOG_CAPACITY: usize = 100_000;
/// 定时器数量上限
pub const MAX_TIMERS: usize = 16;
/// SPI 总线数量
pub const SPI_BUS_COUNT: usize = 4;
/// 串口数量
pub const SERIAL_PORT_COUNT: usize = 4;
/// 串口收发缓冲区大小，必须是 2 的幂
pub const SERIAL_BUFFER_SIZE: usize = 32768;
/// 网络桥接单次读写包大小
pub const NET_PACKET_SIZE: usize = 32768;
/// 网络桥接发送轮询间隔，单位毫秒
pub const NET_POLL_INTERVAL_MS: u64 = 1;
/// SPI 空闲字节
pub const IDLE_BYTE: u8 = 0xFF;
/// 默认 TCP 端口
pub const DEFAULT_NET_PORT: u16 = 8099;
/// 实时倍率上限，达到或超过 [`REALTIME_UNBOUNDED`] 时不再节流
pub const MAX_REALTIME_SCALE: f32 = 100.0;
pub const REALTIME_UNBOUNDED: f32 = 99.0;
/// 串口监视器保留的最大字节数
pub const MONITOR_CAPACITY: usize = 64 * 1024;

// ============================================================================
// 运行期配置
// ============================================================================

/// 运行期仿真参数
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// 实时倍率，0 表示暂停，>= 99 表示不限速
    pub realtime_scale: f32,
    /// 启动时是否记录引脚历史
    pub pin_logging: bool,
    /// 每个引脚的历史记录上限
    pub pin_log_capacity: usize,
    pub spi_buses: usize,
    pub serial_ports: usize,
    /// 被宿主屏蔽的定时器名称，屏蔽后即使固件使能也不会派发
    pub masked_timers: Vec<String>,
    /// 串口 0 的网络桥接端口，`None` 表示不启用
    pub net_port: Option<u16>,
    pub log_level: LogLevel,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            realtime_scale: 1.0,
            pin_logging: false,
            pin_log_capacity: PIN_LOG_CAPACITY,
            spi_buses: SPI_BUS_COUNT,
            serial_ports: SERIAL_PORT_COUNT,
            masked_timers: Vec::new(),
            net_port: None,
            log_level: LogLevel::Info,
        }
    }
}

impl SimConfig {
    /// 从 TOML 文本解析配置
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimConfig =
            toml::from_str(text).map_err(|e| SimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// 检查参数范围
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_REALTIME_SCALE).contains(&self.realtime_scale) {
            return Err(SimError::Config(format!(
                "realtime_scale {} out of range [0, {}]",
                self.realtime_scale, MAX_REALTIME_SCALE
            )));
        }
        if self.pin_log_capacity == 0 {
            return Err(SimError::Config("pin_log_capacity must be positive".into()));
        }
        Ok(())
    }
}
