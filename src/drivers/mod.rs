//! # 外设仿真
//!
//! GPIO 与 SPI 总线是外设模型的接入点，外设通过观察者订阅事件。
//!
//! ## 模块结构
//!
//! - [`traits`]: 观察者 trait 与引脚配置枚举
//! - [`gpio`]: 引脚电平、模式与电平日志
//! - [`spi`]: SPI 总线与传输事件
//! - [`slave`]: 片选驱动的 SPI 从设备分帧
//! - [`devices`]: 限位开关、模拟输入、SPI Flash
//!
//! ## 使用示例
//!
//! ```rust
//! use neon_sim::drivers::devices::EndStop;
//! use neon_sim::kernel::SimBuilder;
//!
//! let ctx = SimBuilder::new().build().unwrap();
//! let _x_min = EndStop::attach(&ctx, 3, false, || true);
//! assert_eq!(ctx.gpio().get(&ctx, 3), 1);
//! ```

pub mod devices;
pub mod gpio;
pub mod slave;
pub mod spi;
pub mod traits;

// 重新导出常用类型
pub use gpio::{Gpio, GpioEvent, GpioEventKind, HIGH, LOW, PinId, PinLogEntry};
pub use slave::{NO_TOKEN, SlaveDevice, SlaveLink, SlavePeripheral};
pub use spi::{SpiBus, SpiEvent};
pub use traits::{ArduinoMode, BusObserver, PinDirection, PinFunction, PinObserver, PullMode};
