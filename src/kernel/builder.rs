//! 仿真构建器
//!
//! 提供链式 API 创建 [`SimContext`]。

use super::context::SimContext;
use super::time::TimeBase;
use super::timer::{TimerRegistry, TimerSpec, default_layout_specs};
use crate::config::{MAX_TIMERS, SimConfig};
use crate::drivers::gpio::Gpio;
use crate::error::{Result, SimError};

/// 仿真构建器
///
/// # 示例
///
/// ```rust
/// use neon_sim::kernel::SimBuilder;
/// use neon_sim::kernel::timer::TimerSpec;
///
/// // 默认定时器布局
/// let ctx = SimBuilder::new().build().unwrap();
/// assert_eq!(ctx.timers().len(), 4);
///
/// // 自定义定时器
/// let ctx = SimBuilder::new()
///     .timers(vec![TimerSpec::new("fast", 1), TimerSpec::new("slow", 9)])
///     .realtime_scale(100.0)
///     .pin_logging(true)
///     .build()
///     .unwrap();
/// assert_eq!(ctx.timers().len(), 2);
/// ```
pub struct SimBuilder {
    config: SimConfig,
    timers: Vec<TimerSpec>,
}

impl SimBuilder {
    /// 创建构建器
    ///
    /// # 默认值
    /// - 配置: `SimConfig::default()`
    /// - 定时器: 默认布局（Stepper、Temperature、SysTick、Firmware Loop）
    pub fn new() -> Self {
        Self::from_config(SimConfig::default())
    }

    pub fn from_config(config: SimConfig) -> Self {
        Self {
            config,
            timers: default_layout_specs(),
        }
    }

    pub fn realtime_scale(mut self, scale: f32) -> Self {
        self.config.realtime_scale = scale;
        self
    }

    pub fn pin_logging(mut self, enabled: bool) -> Self {
        self.config.pin_logging = enabled;
        self
    }

    pub fn pin_log_capacity(mut self, capacity: usize) -> Self {
        self.config.pin_log_capacity = capacity;
        self
    }

    pub fn spi_buses(mut self, count: usize) -> Self {
        self.config.spi_buses = count;
        self
    }

    pub fn serial_ports(mut self, count: usize) -> Self {
        self.config.serial_ports = count;
        self
    }

    /// 屏蔽指定名称的定时器
    pub fn masked_timer(mut self, name: impl Into<String>) -> Self {
        self.config.masked_timers.push(name.into());
        self
    }

    /// 替换定时器布局
    pub fn timers(mut self, specs: Vec<TimerSpec>) -> Self {
        self.timers = specs;
        self
    }

    /// 追加一个定时器
    pub fn timer(mut self, name: impl Into<String>, priority: u32) -> Self {
        self.timers.push(TimerSpec::new(name, priority));
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// 创建仿真上下文
    ///
    /// # 返回值
    /// - `Ok(SimContext)`: 创建成功
    /// - `Err(SimError::Config)`: 参数越界、定时器超过上限或屏蔽了不存在的定时器
    pub fn build(self) -> Result<SimContext> {
        self.config.validate()?;
        if self.timers.len() > MAX_TIMERS {
            return Err(SimError::Config(format!(
                "{} timers exceed the limit of {}",
                self.timers.len(),
                MAX_TIMERS
            )));
        }

        let timers = TimerRegistry::new(&self.timers);
        for name in &self.config.masked_timers {
            let id = timers
                .find(name)
                .ok_or_else(|| SimError::Config(format!("unknown masked timer: {name}")))?;
            timers.set_host_masked(id, true)?;
        }

        let time = TimeBase::new(self.config.realtime_scale);
        let gpio = Gpio::new(self.config.pin_log_capacity);
        let ctx = SimContext::from_parts(
            time,
            timers,
            gpio,
            self.config.spi_buses,
            self.config.serial_ports,
        );
        if self.config.pin_logging {
            ctx.gpio().set_logging_enabled(ctx.time(), true);
        }
        tracing::debug!(
            timers = ctx.timers().len(),
            spi_buses = self.config.spi_buses,
            serial_ports = self.config.serial_ports,
            "simulation context created"
        );
        Ok(ctx)
    }
}

impl Default for SimBuilder {
    fn default() -> Self {
        Self::new()
    }
}
