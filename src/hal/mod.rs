//! # 固件硬件抽象层
//!
//! [`Hal`] 是固件看到的全部硬件：引脚、时间、延时、中断开关、定时器、
//! SPI 与串口。每个方法都直接落到 [`SimContext`] 上对应的组件。
//!
//! 会推进虚拟时间的方法返回 `Result`，退出请求通过 `?` 一路传回固件主循环。
//!
//! ## 使用示例
//!
//! ```rust
//! use neon_sim::drivers::ArduinoMode;
//! use neon_sim::hal::Hal;
//! use neon_sim::kernel::SimBuilder;
//!
//! let ctx = SimBuilder::new().realtime_scale(100.0).build().unwrap();
//! ctx.start();
//! let hal = Hal::new(&ctx);
//!
//! hal.pin_mode(13, ArduinoMode::Output);
//! hal.digital_write(13, 1);
//! assert_eq!(hal.digital_read(13), 1);
//!
//! hal.delay(2).unwrap();
//! assert!(hal.millis().unwrap() >= 2);
//! ```

pub mod serial;

use std::sync::Arc;

use crate::drivers::gpio::PinId;
use crate::drivers::traits::ArduinoMode;
use crate::error::Result;
use crate::kernel::SimContext;
use crate::kernel::timer::TimerId;
use serial::HalSerial;

/// 固件硬件抽象层
#[derive(Clone, Copy)]
pub struct Hal<'a> {
    ctx: &'a SimContext,
}

impl<'a> Hal<'a> {
    pub fn new(ctx: &'a SimContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &'a SimContext {
        self.ctx
    }

    // ========================================================================
    // GPIO
    // ========================================================================

    pub fn pin_mode(&self, pin: PinId, mode: ArduinoMode) {
        self.ctx.gpio().set_mode(self.ctx, pin, mode);
    }

    pub fn digital_write(&self, pin: PinId, value: u16) {
        self.ctx.gpio().set(self.ctx, pin, value);
    }

    /// 读取引脚，先通知观察者刷新电平
    pub fn digital_read(&self, pin: PinId) -> u16 {
        self.ctx.gpio().get(self.ctx, pin)
    }

    pub fn analog_write(&self, pin: PinId, value: u16) {
        self.ctx.gpio().set(self.ctx, pin, value);
    }

    pub fn analog_read(&self, pin: PinId) -> u16 {
        self.ctx.gpio().get(self.ctx, pin)
    }

    /// 10 位 ADC 读数，引脚上保存的是 12 位原始值
    pub fn adc_value(&self, pin: PinId) -> u16 {
        (self.analog_read(pin) >> 2) & 0x3FF
    }

    // ========================================================================
    // 时间
    // ========================================================================

    pub fn millis(&self) -> Result<u64> {
        self.ctx.time().millis()
    }

    pub fn micros(&self) -> Result<u64> {
        self.ctx.time().micros()
    }

    pub fn delay(&self, millis: u64) -> Result<()> {
        self.ctx.delay_millis(millis)
    }

    pub fn delay_microseconds(&self, micros: u64) -> Result<()> {
        self.ctx.delay_micros(micros)
    }

    pub fn delay_nanos(&self, nanos: u64) -> Result<()> {
        self.ctx.delay_nanos(nanos)
    }

    /// 空闲等待，让出给其他虚拟中断
    pub fn idle(&self) -> Result<()> {
        self.ctx.yield_now()
    }

    // ========================================================================
    // 中断
    // ========================================================================

    pub fn no_interrupts(&self) {
        self.ctx.scheduler().disable_interrupts();
    }

    pub fn interrupts(&self) {
        self.ctx.scheduler().enable_interrupts();
    }

    // ========================================================================
    // 定时器
    // ========================================================================

    pub fn timer_init(&self, timer: TimerId, frequency: u64) -> Result<()> {
        self.ctx.timers().init(timer, frequency)
    }

    /// 以当前时刻为周期起点启动定时器
    pub fn timer_start(&self, timer: TimerId, interrupt_frequency: u64) -> Result<()> {
        self.ctx
            .timers()
            .start(timer, self.ctx.time().ticks(), interrupt_frequency)
    }

    pub fn timer_enable_interrupt(&self, timer: TimerId) -> Result<()> {
        self.ctx.timers().enable(timer)
    }

    pub fn timer_disable_interrupt(&self, timer: TimerId) -> Result<()> {
        self.ctx.timers().disable(timer)
    }

    pub fn timer_interrupt_enabled(&self, timer: TimerId) -> Result<bool> {
        self.ctx.timers().is_enabled(timer)
    }

    pub fn timer_set_compare(&self, timer: TimerId, compare: u64) -> Result<()> {
        self.ctx.timers().set_compare(timer, compare)
    }

    pub fn timer_get_compare(&self, timer: TimerId) -> Result<u64> {
        self.ctx.timers().compare(timer)
    }

    pub fn timer_get_count(&self, timer: TimerId) -> Result<u64> {
        self.ctx.timer_get_count(timer)
    }

    // ========================================================================
    // SPI
    // ========================================================================

    pub fn spi_transfer(&self, bus: usize, byte: u8) -> Result<u8> {
        Ok(self.ctx.spi_bus(bus)?.transfer(self.ctx, byte))
    }

    pub fn spi_send(&self, bus: usize, byte: u8) -> Result<()> {
        self.ctx.spi_bus(bus)?.write(self.ctx, byte);
        Ok(())
    }

    /// 接收一个字节，发送空闲字节
    pub fn spi_receive(&self, bus: usize) -> Result<u8> {
        self.spi_transfer(bus, crate::config::IDLE_BYTE)
    }

    pub fn spi_read(&self, bus: usize, buffer: &mut [u8]) -> Result<()> {
        self.ctx.spi_bus(bus)?.transfer_bytes(self.ctx, None, Some(buffer));
        Ok(())
    }

    /// 发送令牌字节后跟一个数据块
    pub fn spi_send_block(&self, bus: usize, token: u8, block: &[u8]) -> Result<()> {
        let spi = self.ctx.spi_bus(bus)?;
        spi.write(self.ctx, token);
        spi.transfer_bytes(self.ctx, Some(block), None);
        Ok(())
    }

    /// 先高字节后低字节的两次 8 位传输
    pub fn spi_transfer16(&self, bus: usize, word: u16) -> Result<u16> {
        let [high, low] = word.to_be_bytes();
        let high = self.spi_transfer(bus, high)?;
        let low = self.spi_transfer(bus, low)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    // ========================================================================
    // 串口
    // ========================================================================

    pub fn serial(&self, port: usize) -> Result<&'a Arc<HalSerial>> {
        self.ctx.serial(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::devices::AnalogInput;
    use crate::kernel::SimBuilder;
    use crate::kernel::timer::SYSTICK_TIMER;

    #[test]
    fn test_adc_value_is_ten_bits() {
        let ctx = SimBuilder::new().build().unwrap();
        let _thermistor = AnalogInput::attach(&ctx, 40, || 4095);
        assert_eq!(Hal::new(&ctx).adc_value(40), 1023);
    }

    #[test]
    fn test_timer_functions() {
        let ctx = SimBuilder::new().realtime_scale(100.0).build().unwrap();
        let hal = Hal::new(&ctx);
        hal.timer_init(SYSTICK_TIMER, 1_000_000).unwrap();
        hal.timer_start(SYSTICK_TIMER, 1_000).unwrap();
        assert_eq!(hal.timer_get_compare(SYSTICK_TIMER).unwrap(), 1_000);
        hal.timer_set_compare(SYSTICK_TIMER, 500).unwrap();
        assert!(!hal.timer_interrupt_enabled(SYSTICK_TIMER).unwrap());
        hal.timer_enable_interrupt(SYSTICK_TIMER).unwrap();
        assert!(hal.timer_interrupt_enabled(SYSTICK_TIMER).unwrap());
        hal.timer_disable_interrupt(SYSTICK_TIMER).unwrap();
        assert!(!hal.timer_interrupt_enabled(SYSTICK_TIMER).unwrap());
    }

    #[test]
    fn test_interrupt_gate() {
        let ctx = SimBuilder::new().build().unwrap();
        let hal = Hal::new(&ctx);
        hal.no_interrupts();
        assert!(!ctx.scheduler().interrupts_enabled());
        hal.interrupts();
        assert!(ctx.scheduler().interrupts_enabled());
    }

    #[test]
    fn test_spi_without_device_reads_idle() {
        let ctx = SimBuilder::new().build().unwrap();
        let hal = Hal::new(&ctx);
        assert_eq!(hal.spi_receive(0).unwrap(), 0xFF);
        assert_eq!(hal.spi_transfer16(0, 0x1234).unwrap(), 0xFFFF);
        let mut block = [0u8; 4];
        hal.spi_read(0, &mut block).unwrap();
        assert_eq!(block, [0xFF; 4]);
        assert!(hal.spi_send(9, 0).is_err());
    }
}
