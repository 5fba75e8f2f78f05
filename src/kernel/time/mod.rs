//! 时间模块
//!
//! - [`TimeBase`]: 虚拟 tick 计数器与实时同步
//! - [`rate`]: 时钟域之间的换算

pub mod rate;
mod time_base;

pub use rate::{convert_frequency, nanos_to_ticks, ticks_to_nanos};
pub use time_base::TimeBase;
