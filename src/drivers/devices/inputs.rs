//! 主动读取的输入设备
//!
//! 固件每次 `digital_read()`/`analog_read()` 都会发出 GetValue 事件，
//! 这里的设备在事件中把最新状态静默写回引脚，读取结果总是最新的。

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::drivers::gpio::{GpioEvent, GpioEventKind, PinId};
use crate::drivers::traits::PinObserver;
use crate::kernel::SimContext;

type Trigger = Box<dyn Fn() -> bool + Send + Sync>;
type Sample = Box<dyn Fn() -> u16 + Send + Sync>;

/// 限位开关
///
/// 引脚电平为 `(triggered XOR invert) && enabled`。
pub struct EndStop {
    pin: PinId,
    invert: bool,
    enabled: AtomicBool,
    triggered: Trigger,
    reads: AtomicU64,
}

impl EndStop {
    pub fn attach(
        ctx: &SimContext,
        pin: PinId,
        invert: bool,
        triggered: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        let endstop = Arc::new(Self {
            pin,
            invert,
            enabled: AtomicBool::new(true),
            triggered: Box::new(triggered),
            reads: AtomicU64::new(0),
        });
        ctx.gpio().attach(pin, endstop.clone());
        endstop
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// 当前应呈现的电平
    pub fn level(&self) -> bool {
        ((self.triggered)() != self.invert) && self.is_enabled()
    }

    /// 被固件读取的次数
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl PinObserver for EndStop {
    fn on_gpio_event(&self, ctx: &SimContext, event: &GpioEvent) {
        if event.pin == self.pin && event.kind == GpioEventKind::GetValue {
            self.reads.fetch_add(1, Ordering::Relaxed);
            ctx.gpio()
                .set_value_silent(ctx.time(), self.pin, u16::from(self.level()));
        }
    }
}

/// 模拟量输入
///
/// 每次读取时调用采样函数。
pub struct AnalogInput {
    pin: PinId,
    sample: Sample,
}

impl AnalogInput {
    pub fn attach(
        ctx: &SimContext,
        pin: PinId,
        sample: impl Fn() -> u16 + Send + Sync + 'static,
    ) -> Arc<Self> {
        let input = Arc::new(Self {
            pin,
            sample: Box::new(sample),
        });
        ctx.gpio().attach(pin, input.clone());
        input
    }
}

impl PinObserver for AnalogInput {
    fn on_gpio_event(&self, ctx: &SimContext, event: &GpioEvent) {
        if event.pin == self.pin && event.kind == GpioEventKind::GetValue {
            ctx.gpio().set_value_silent(ctx.time(), self.pin, (self.sample)());
        }
    }
}
