//! # 外设观察者 Trait 定义
//!
//! 外设模型通过观察者接入 GPIO 与 SPI 总线。
//!
//! ## Trait 层次结构
//!
//! ```text
//! PinObserver (引脚事件)
//!    ├── EndStop、AnalogInput (主动读取)
//!    └── SlavePeripheral (片选边沿)
//! BusObserver (SPI 总线事件)
//!    └── SlavePeripheral (逐字节收发)
//! ```
//!
//! 观察者回调在触发事件的线程上同步执行，调用时不持有任何 GPIO 或总线的锁，
//! 因此回调内可以再次读写引脚。

use crate::drivers::gpio::GpioEvent;
use crate::drivers::spi::SpiEvent;
use crate::kernel::SimContext;

// ============================================================================
// 观察者 Trait
// ============================================================================

/// 引脚事件观察者
///
/// # 示例
///
/// ```rust
/// use neon_sim::drivers::{GpioEvent, GpioEventKind, PinObserver};
/// use neon_sim::kernel::SimContext;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// struct EdgeCounter(AtomicU32);
///
/// impl PinObserver for EdgeCounter {
///     fn on_gpio_event(&self, _ctx: &SimContext, event: &GpioEvent) {
///         if event.kind == GpioEventKind::Rise {
///             self.0.fetch_add(1, Ordering::Relaxed);
///         }
///     }
/// }
/// ```
pub trait PinObserver: Send + Sync {
    fn on_gpio_event(&self, ctx: &SimContext, event: &GpioEvent);
}

/// SPI 总线观察者
///
/// 多个观察者依次收到同一个事件，写入 `read_into` 的数据以最后一个写入者为准。
pub trait BusObserver: Send + Sync {
    fn on_spi_event(&self, ctx: &SimContext, event: &mut SpiEvent<'_>);
}

// ============================================================================
// GPIO 配置
// ============================================================================

/// 引脚复用功能
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PinFunction {
    #[default]
    Gpio = 0,
    Adc = 1,
    Spi = 2,
    I2c = 3,
    Uart = 4,
}

impl PinFunction {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PinFunction::Adc,
            2 => PinFunction::Spi,
            3 => PinFunction::I2c,
            4 => PinFunction::Uart,
            _ => PinFunction::Gpio,
        }
    }
}

/// 引脚方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PinDirection {
    #[default]
    Input = 0,
    Output = 1,
}

impl PinDirection {
    pub fn from_u8(value: u8) -> Self {
        if value == 1 {
            PinDirection::Output
        } else {
            PinDirection::Input
        }
    }
}

/// GPIO 上拉/下拉配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PullMode {
    /// 无上拉/下拉
    #[default]
    None = 0,
    /// 上拉
    PullUp = 1,
    /// 下拉
    PullDown = 2,
    /// 高阻
    Tristate = 3,
}

impl PullMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PullMode::PullUp,
            2 => PullMode::PullDown,
            3 => PullMode::Tristate,
            _ => PullMode::None,
        }
    }
}

/// 固件 `pinMode()` 的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArduinoMode {
    Input = 0,
    Output = 1,
    InputPullup = 2,
    InputPulldown = 3,
}

impl ArduinoMode {
    pub fn direction(self) -> PinDirection {
        match self {
            ArduinoMode::Output => PinDirection::Output,
            _ => PinDirection::Input,
        }
    }

    pub fn pull(self) -> PullMode {
        match self {
            ArduinoMode::InputPullup => PullMode::PullUp,
            ArduinoMode::InputPulldown => PullMode::PullDown,
            _ => PullMode::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arduino_mode_mapping() {
        assert_eq!(ArduinoMode::Output.direction(), PinDirection::Output);
        assert_eq!(ArduinoMode::Input.direction(), PinDirection::Input);
        assert_eq!(ArduinoMode::InputPullup.direction(), PinDirection::Input);
        assert_eq!(ArduinoMode::InputPullup.pull(), PullMode::PullUp);
        assert_eq!(ArduinoMode::InputPulldown.pull(), PullMode::PullDown);
        assert_eq!(ArduinoMode::Output.pull(), PullMode::None);
    }

    #[test]
    fn test_round_trip_u8() {
        for value in 0..5u8 {
            assert_eq!(PinFunction::from_u8(value) as u8, value);
        }
        assert_eq!(PullMode::from_u8(PullMode::Tristate as u8), PullMode::Tristate);
        assert_eq!(PinDirection::from_u8(7), PinDirection::Input);
    }
}
