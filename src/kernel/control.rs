//! 执行控制
//!
//! 退出请求与调试中断请求。所有会推进时间的操作都会调用 [`ExecutionControl::poll`]，
//! 退出请求以 `Err(SimError::QuitRequested)` 的形式穿过所有嵌套的中断帧，
//! 由顶层驱动线程统一处理。

use std::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::RwLock;

use crate::error::{Result, SimError};

/// 调试中断处理函数，参数为当前 tick
pub type BreakHandler = Arc<dyn Fn(u64) + Send + Sync>;

pub struct ExecutionControl {
    quit: AtomicBool,
    break_requested: AtomicBool,
    break_handler: RwLock<Option<BreakHandler>>,
}

impl ExecutionControl {
    pub fn new() -> Self {
        Self {
            quit: AtomicBool::new(false),
            break_requested: AtomicBool::new(false),
            break_handler: RwLock::new(None),
        }
    }

    /// 请求退出仿真
    ///
    /// 可以从任意线程调用，下一次轮询时生效。
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
    }

    pub fn is_quit_requested(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    /// 请求一次调试中断
    ///
    /// 请求只会被消费一次。
    pub fn request_break(&self) {
        self.break_requested.store(true, Ordering::Release);
    }

    /// 安装调试中断处理函数，替换之前的处理函数
    pub fn set_break_handler(&self, handler: impl Fn(u64) + Send + Sync + 'static) {
        *self.break_handler.write() = Some(Arc::new(handler));
    }

    /// 检查退出与调试中断请求
    ///
    /// # 参数
    /// - `now`: 当前 tick，传给调试中断处理函数
    ///
    /// # 返回值
    /// - `Ok(())`: 继续执行
    /// - `Err(SimError::QuitRequested)`: 需要退出
    pub fn poll(&self, now: u64) -> Result<()> {
        if self.is_quit_requested() {
            return Err(SimError::QuitRequested);
        }
        if self.break_requested.swap(false, Ordering::AcqRel) {
            // 处理函数可能再次安装处理函数，先克隆出来再调用
            let handler = self.break_handler.read().clone();
            match handler {
                Some(handler) => handler(now),
                None => tracing::warn!(tick = now, "debug break requested"),
            }
        }
        Ok(())
    }
}

impl Default for ExecutionControl {
    fn default() -> Self {
        Self::new()
    }
}
