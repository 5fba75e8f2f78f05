//! # neon-sim
//!
//! 单片机固件仿真内核：虚拟时间、可重入的优先级抢占中断调度、GPIO 事件总线、
//! SPI 从设备分帧以及串口/网络桥接。
//!
//! ## 模块结构
//!
//! - [`kernel`]: 时间基准、虚拟定时器、调度器、固件宿主
//! - [`drivers`]: GPIO、SPI 总线、从设备分帧、外设模型
//! - [`hal`]: 固件使用的硬件抽象层与串口
//! - [`ipc`]: 环形缓冲区与传输层
//! - [`net`]: TCP 串口桥接
//! - [`config`]、[`log`]、[`error`]: 配置、日志、错误类型

pub mod config;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod ipc;
pub mod kernel;
pub mod log;
pub mod net;

pub use paste;
