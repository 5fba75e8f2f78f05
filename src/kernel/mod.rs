//! # 仿真内核
//!
//! 虚拟时间、虚拟定时器与可重入的中断调度器。
//!
//! ## 模块结构
//!
//! - [`context`]: 持有一次仿真全部状态的 [`SimContext`]
//! - [`builder`]: 创建上下文的 [`SimBuilder`]
//! - [`control`]: 退出与断点请求
//! - [`time`]: tick 计数、实时同步、时钟域换算
//! - [`timer`]: 虚拟定时器与注册表
//! - [`scheduler`]: 中断调度
//! - [`firmware`]: 固件主循环宿主

pub mod builder;
pub mod context;
pub mod control;
pub mod firmware;
pub mod scheduler;
pub mod time;
pub mod timer;

pub use builder::SimBuilder;
pub use context::SimContext;
pub use control::ExecutionControl;
pub use firmware::{Firmware, spawn_firmware_thread};
pub use scheduler::{Scheduler, SchedulerStats};
