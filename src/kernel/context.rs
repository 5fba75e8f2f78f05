//! # 仿真上下文
//!
//! [`SimContext`] 持有一次仿真的全部状态：时间基准、定时器、调度器、GPIO、
//! SPI 总线、串口与传输层。所有组件都通过 `&SimContext` 访问，
//! 同一进程内可以同时存在多个互不影响的仿真。
//!
//! ## 使用示例
//!
//! ```rust
//! use neon_sim::kernel::SimBuilder;
//! use neon_sim::kernel::timer::SYSTICK_TIMER;
//!
//! let ctx = SimBuilder::new().realtime_scale(100.0).build().unwrap();
//! ctx.timers().init(SYSTICK_TIMER, 1_000_000).unwrap();
//! ctx.timers().start(SYSTICK_TIMER, ctx.time().ticks(), 1_000).unwrap();
//! ctx.timers().enable(SYSTICK_TIMER).unwrap();
//!
//! ctx.start();
//! ctx.delay_millis(5).unwrap();
//! assert_eq!(ctx.time().now_millis(), 5);
//! ```

use std::sync::Arc;

use spin::RwLock;

use super::builder::SimBuilder;
use super::scheduler::Scheduler;
use super::time::TimeBase;
use super::timer::{TimerId, TimerRegistry};
use crate::drivers::gpio::Gpio;
use crate::drivers::spi::SpiBus;
use crate::error::{Result, SimError};
use crate::hal::serial::HalSerial;
use crate::ipc::transport::TransportPump;
use crate::kernel::time::rate::{MICROS_PER_SECOND, MILLIS_PER_SECOND, NANOS_PER_SECOND};

pub struct SimContext {
    time: TimeBase,
    timers: TimerRegistry,
    scheduler: Scheduler,
    gpio: Gpio,
    spi_buses: Vec<SpiBus>,
    serial_ports: Vec<Arc<HalSerial>>,
    /// 写时复制，搬运时不持锁
    transports: RwLock<Arc<Vec<Arc<dyn TransportPump>>>>,
}

impl SimContext {
    pub(crate) fn from_parts(
        time: TimeBase,
        timers: TimerRegistry,
        gpio: Gpio,
        spi_buses: usize,
        serial_ports: usize,
    ) -> Self {
        Self {
            time,
            timers,
            scheduler: Scheduler::new(),
            gpio,
            spi_buses: (0..spi_buses).map(SpiBus::new).collect(),
            serial_ports: (0..serial_ports)
                .map(|_| Arc::new(HalSerial::new()))
                .collect(),
            transports: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn builder() -> SimBuilder {
        SimBuilder::new()
    }

    // ========================================================================
    // 组件访问
    // ========================================================================

    pub fn time(&self) -> &TimeBase {
        &self.time
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn gpio(&self) -> &Gpio {
        &self.gpio
    }

    pub fn spi_bus(&self, index: usize) -> Result<&SpiBus> {
        self.spi_buses.get(index).ok_or(SimError::BusNotFound(index))
    }

    pub fn spi_buses(&self) -> &[SpiBus] {
        &self.spi_buses
    }

    pub fn serial(&self, port: usize) -> Result<&Arc<HalSerial>> {
        self.serial_ports
            .get(port)
            .ok_or(SimError::SerialPortNotFound(port))
    }

    pub fn serial_ports(&self) -> &[Arc<HalSerial>] {
        &self.serial_ports
    }

    // ========================================================================
    // 传输层
    // ========================================================================

    /// 注册传输层，每次调度迭代按注册顺序搬运一次
    pub fn add_transport(&self, transport: Arc<dyn TransportPump>) {
        let mut transports = self.transports.write();
        let mut next: Vec<_> = transports.iter().cloned().collect();
        next.push(transport);
        *transports = Arc::new(next);
    }

    pub(crate) fn pump_transports(&self) {
        let transports = self.transports.read().clone();
        for transport in transports.iter() {
            transport.pump(self);
        }
    }

    // ========================================================================
    // 执行控制
    // ========================================================================

    pub fn start(&self) {
        self.scheduler.start();
    }

    /// 请求退出，可以从任意线程调用
    pub fn request_quit(&self) {
        self.time.control().request_quit();
    }

    pub fn is_quit_requested(&self) -> bool {
        self.time.control().is_quit_requested()
    }

    pub fn request_break(&self) {
        self.time.control().request_break();
    }

    pub fn set_realtime_scale(&self, scale: f32) {
        self.time.set_realtime_scale(scale);
    }

    pub fn run(&self) -> Result<()> {
        self.scheduler.run(self)
    }

    pub fn execute_loop(&self, bound: u64) -> Result<bool> {
        self.scheduler.execute_loop(self, bound)
    }

    pub fn delay_cycles(&self, cycles: u64) -> Result<()> {
        self.scheduler.delay_cycles(self, cycles)
    }

    pub fn delay_nanos(&self, nanos: u64) -> Result<()> {
        self.delay_cycles(self.time.nanos_to_ticks(nanos))
    }

    pub fn delay_micros(&self, micros: u64) -> Result<()> {
        self.delay_nanos(micros.saturating_mul(NANOS_PER_SECOND / MICROS_PER_SECOND))
    }

    pub fn delay_millis(&self, millis: u64) -> Result<()> {
        self.delay_nanos(millis.saturating_mul(NANOS_PER_SECOND / MILLIS_PER_SECOND))
    }

    pub fn yield_now(&self) -> Result<()> {
        self.scheduler.yield_now(self)
    }

    /// 读取定时器计数
    ///
    /// 固件常在忙等中读取计数，因此每次读取推进一个轮询步进。
    pub fn timer_get_count(&self, id: TimerId) -> Result<u64> {
        self.time.poll()?;
        self.time.add_ticks(self.time.poll_quantum());
        let now = self.time.ticks();
        let frequency = self.time.frequency();
        self.timers.with_timer(id, |timer| timer.count(now, frequency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPump(AtomicUsize);

    impl TransportPump for CountingPump {
        fn pump(&self, _ctx: &SimContext) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sim() -> SimContext {
        SimBuilder::new().realtime_scale(100.0).build().unwrap()
    }

    #[test]
    fn test_component_lookup() {
        let ctx = sim();
        assert!(ctx.spi_bus(3).is_ok());
        assert_eq!(ctx.spi_bus(4).err(), Some(SimError::BusNotFound(4)));
        assert!(ctx.serial(0).is_ok());
        assert_eq!(ctx.serial(9).err(), Some(SimError::SerialPortNotFound(9)));
    }

    #[test]
    fn test_transports_pumped_every_iteration() {
        let ctx = sim();
        let pump = Arc::new(CountingPump(AtomicUsize::new(0)));
        ctx.add_transport(pump.clone());
        ctx.start();
        for _ in 0..5 {
            ctx.execute_loop(u64::MAX).unwrap();
        }
        assert_eq!(pump.0.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_delay_units() {
        let ctx = sim();
        ctx.start();
        ctx.delay_micros(3).unwrap();
        assert_eq!(ctx.time().ticks(), 300);
        ctx.delay_millis(2).unwrap();
        assert_eq!(ctx.time().now_micros(), 2003);
    }

    #[test]
    fn test_timer_count_advances_time() {
        let ctx = sim();
        let id = TimerId::new(0);
        ctx.timers().init(id, 1_000_000).unwrap();
        ctx.timers().start(id, 0, 1_000).unwrap();
        let before = ctx.time().ticks();
        let count = ctx.timer_get_count(id).unwrap();
        assert_eq!(ctx.time().ticks(), before + ctx.time().poll_quantum());
        assert_eq!(count, 0);
        ctx.time().add_ticks(1_000);
        assert_eq!(ctx.timer_get_count(id).unwrap(), 10);
    }
}
