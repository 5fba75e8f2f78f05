//! # 固件宿主
//!
//! 固件主循环本身就是一个虚拟定时器中断：`setup()` 在第一次中断中执行，
//! 之后每次中断执行一次 `run_loop()`。固件内部的延时和空闲等待都会重入调度器，
//! 所以主循环优先级最低，其余中断可以随时抢占它。
//!
//! ## 使用示例
//!
//! ```rust
//! use std::sync::Arc;
//! use neon_sim::drivers::ArduinoMode;
//! use neon_sim::error::Result;
//! use neon_sim::hal::Hal;
//! use neon_sim::kernel::SimBuilder;
//! use neon_sim::kernel::firmware::{Firmware, spawn_firmware_thread};
//! use neon_sim::kernel::timer::FIRMWARE_LOOP_TIMER;
//!
//! struct Blink;
//!
//! impl Firmware for Blink {
//!     fn setup(&mut self, hal: &Hal) -> Result<()> {
//!         hal.pin_mode(13, ArduinoMode::Output);
//!         Ok(())
//!     }
//!
//!     fn run_loop(&mut self, hal: &Hal) -> Result<()> {
//!         let level = hal.digital_read(13);
//!         hal.digital_write(13, level ^ 1);
//!         hal.delay(500)
//!     }
//! }
//!
//! let ctx = Arc::new(SimBuilder::new().realtime_scale(100.0).build().unwrap());
//! ctx.install_firmware(FIRMWARE_LOOP_TIMER, Blink).unwrap();
//! let handle = spawn_firmware_thread(ctx.clone()).unwrap();
//! ctx.request_quit();
//! handle.join().unwrap().unwrap();
//! ```

use std::sync::Arc;
use std::thread::JoinHandle;

use spin::Mutex;

use super::context::SimContext;
use super::timer::TimerId;
use crate::error::{Result, SimError};
use crate::hal::Hal;

/// 固件主循环的时钟域频率
pub const FIRMWARE_TIMER_FREQUENCY: u64 = 1_000_000;
/// 固件主循环频率
pub const FIRMWARE_LOOP_FREQUENCY: u64 = 500;

/// 运行在仿真中的固件
pub trait Firmware: Send + 'static {
    /// 只在第一次主循环中断中调用一次
    fn setup(&mut self, hal: &Hal) -> Result<()>;

    fn run_loop(&mut self, hal: &Hal) -> Result<()>;
}

struct Hosted<F> {
    firmware: F,
    initialised: bool,
}

impl<F: Firmware> Hosted<F> {
    fn step(&mut self, hal: &Hal) -> Result<()> {
        if self.initialised {
            return self.firmware.run_loop(hal);
        }
        self.initialised = true;
        tracing::info!("firmware setup");
        self.firmware.setup(hal)
    }
}

impl SimContext {
    /// 把固件绑定到 `timer`，并以 500 Hz 启动
    pub fn install_firmware(&self, timer: TimerId, firmware: impl Firmware) -> Result<()> {
        let hosted = Arc::new(Mutex::new(Hosted {
            firmware,
            initialised: false,
        }));
        self.timers().set_isr(timer, move |ctx| {
            // 主循环中断不会重入，锁不会被自己持有
            hosted.lock().step(&Hal::new(ctx))
        })?;
        self.timers().init(timer, FIRMWARE_TIMER_FREQUENCY)?;
        self.timers()
            .start(timer, self.time().ticks(), FIRMWARE_LOOP_FREQUENCY)?;
        self.timers().enable(timer)
    }
}

/// 在名为 `simulation_main` 的线程上运行仿真
///
/// # 返回值
/// - `Ok(JoinHandle)`: 线程已启动，`join` 得到 [`SimContext::run`] 的结果
/// - `Err(SimError::Network)`: 线程创建失败
pub fn spawn_firmware_thread(ctx: Arc<SimContext>) -> Result<JoinHandle<Result<()>>> {
    std::thread::Builder::new()
        .name("simulation_main".into())
        .spawn(move || ctx.run())
        .map_err(|e| SimError::Network(format!("failed to spawn simulation thread: {e}")))
}
