//! 错误类型模块
//!
//! 统一的仿真错误类型与 `Result` 别名。

mod types;

pub use types::{Result, SimError};
