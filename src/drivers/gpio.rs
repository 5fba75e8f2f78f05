//! # GPIO 仿真
//!
//! 256 个引脚，每个引脚保存数值、复用功能、方向、上下拉、观察者列表和历史记录。
//!
//! ## 功能特性
//!
//! - `set()` 只在数值变化时记录并通知，按数值变化分类为 Rise/Fall/SetValue
//! - `get()` 先发出 GetValue 事件再读取，外设模型可以在事件中更新数值（主动读取）
//! - `set_value_silent()` 供外设模型使用，只记录不通知
//! - 历史记录每个引脚最多保留 `capacity` 条，超出时丢弃最旧的
//! - 观察者按注册顺序同步调用，调用时不持锁
//!
//! ## 使用示例
//!
//! ```rust
//! use neon_sim::kernel::SimBuilder;
//!
//! let ctx = SimBuilder::new().pin_logging(true).build().unwrap();
//! let gpio = ctx.gpio();
//!
//! gpio.set(&ctx, 13, 1);
//! gpio.set(&ctx, 13, 1);
//! assert_eq!(gpio.value(13), 1);
//! // 初始记录 + 一次变化
//! assert_eq!(gpio.log_len(13), 2);
//! ```

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, Ordering};
use std::collections::VecDeque;
use std::sync::Arc;

use spin::{Mutex, RwLock};

use super::traits::{ArduinoMode, PinDirection, PinFunction, PinObserver, PullMode};
use crate::config::PIN_COUNT;
use crate::kernel::SimContext;
use crate::kernel::time::TimeBase;

/// 引脚编号，0..=255 全部有效
pub type PinId = u8;

pub const LOW: u16 = 0;
pub const HIGH: u16 = 1;

/// GPIO 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioEventKind {
    Nop,
    Fall,
    Rise,
    /// 写入了大于 1 的数值（模拟量）或无条件写入
    SetValue,
    SetMode,
    SetDirection,
    GetValue,
}

/// GPIO 事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioEvent {
    /// 事件发生时的全局 tick
    pub timestamp: u64,
    pub pin: PinId,
    pub kind: GpioEventKind,
}

/// 引脚历史记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinLogEntry {
    pub timestamp_nanos: u64,
    pub value: u16,
}

type ObserverList = Arc<Vec<Arc<dyn PinObserver>>>;

struct Pin {
    value: AtomicU16,
    function: AtomicU8,
    direction: AtomicU8,
    pull: AtomicU8,
    /// 写时复制，通知时克隆 Arc 后释放锁
    observers: RwLock<ObserverList>,
    log: Mutex<VecDeque<PinLogEntry>>,
}

impl Pin {
    fn new() -> Self {
        Self {
            value: AtomicU16::new(LOW),
            function: AtomicU8::new(PinFunction::Gpio as u8),
            direction: AtomicU8::new(PinDirection::Input as u8),
            pull: AtomicU8::new(PullMode::None as u8),
            observers: RwLock::new(Arc::new(Vec::new())),
            log: Mutex::new(VecDeque::new()),
        }
    }
}

pub struct Gpio {
    pins: Box<[Pin]>,
    logging: AtomicBool,
    log_capacity: usize,
}

impl Gpio {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            pins: (0..PIN_COUNT).map(|_| Pin::new()).collect(),
            logging: AtomicBool::new(false),
            log_capacity: log_capacity.max(1),
        }
    }

    #[inline]
    fn pin(&self, pin: PinId) -> &Pin {
        &self.pins[pin as usize]
    }

    // ========================================================================
    // 观察者
    // ========================================================================

    /// 注册观察者，按注册顺序通知
    pub fn attach(&self, pin: PinId, observer: Arc<dyn PinObserver>) {
        let mut observers = self.pin(pin).observers.write();
        let mut next: Vec<_> = observers.iter().cloned().collect();
        next.push(observer);
        *observers = Arc::new(next);
    }

    pub fn observer_count(&self, pin: PinId) -> usize {
        self.pin(pin).observers.read().len()
    }

    fn dispatch(&self, ctx: &SimContext, pin: PinId, kind: GpioEventKind) {
        let observers = self.pin(pin).observers.read().clone();
        if observers.is_empty() {
            return;
        }
        let event = GpioEvent {
            timestamp: ctx.time().ticks(),
            pin,
            kind,
        };
        for observer in observers.iter() {
            observer.on_gpio_event(ctx, &event);
        }
    }

    // ========================================================================
    // 数值读写
    // ========================================================================

    /// 设置引脚数值
    ///
    /// 数值不变时不记录也不通知。
    pub fn set(&self, ctx: &SimContext, pin: PinId, value: u16) {
        let previous = self.pin(pin).value.swap(value, Ordering::AcqRel);
        if previous == value {
            return;
        }
        let kind = if value > HIGH {
            GpioEventKind::SetValue
        } else if value > previous {
            GpioEventKind::Rise
        } else if value < previous {
            GpioEventKind::Fall
        } else {
            GpioEventKind::Nop
        };
        self.record(ctx.time(), pin, value);
        self.dispatch(ctx, pin, kind);
    }

    /// 无条件写入并发出 SetValue 事件
    pub fn write(&self, ctx: &SimContext, pin: PinId, value: u16) {
        let previous = self.pin(pin).value.swap(value, Ordering::AcqRel);
        if previous != value {
            self.record(ctx.time(), pin, value);
        }
        self.dispatch(ctx, pin, GpioEventKind::SetValue);
    }

    /// 外设模型写入引脚数值，只记录不通知
    pub fn set_value_silent(&self, time: &TimeBase, pin: PinId, value: u16) {
        let previous = self.pin(pin).value.swap(value, Ordering::AcqRel);
        if previous != value {
            self.record(time, pin, value);
        }
    }

    /// 固件读取引脚
    ///
    /// 先发出 GetValue 事件，再返回（可能已被观察者更新的）数值。
    pub fn get(&self, ctx: &SimContext, pin: PinId) -> u16 {
        self.dispatch(ctx, pin, GpioEventKind::GetValue);
        self.value(pin)
    }

    /// 直接读取引脚数值，不发出事件
    pub fn value(&self, pin: PinId) -> u16 {
        self.pin(pin).value.load(Ordering::Acquire)
    }

    // ========================================================================
    // 模式配置
    // ========================================================================

    /// 固件 `pinMode()`
    ///
    /// 功能切回 GPIO，按参数设置方向与上下拉，上拉输入会把引脚拉高。
    pub fn set_mode(&self, ctx: &SimContext, pin: PinId, mode: ArduinoMode) {
        let state = self.pin(pin);
        state.function.store(PinFunction::Gpio as u8, Ordering::Release);
        self.dispatch(ctx, pin, GpioEventKind::SetMode);

        self.set_direction(ctx, pin, mode.direction());

        let pull = mode.pull();
        state.pull.store(pull as u8, Ordering::Release);
        if pull == PullMode::PullUp {
            self.set(ctx, pin, HIGH);
        }
    }

    pub fn set_direction(&self, ctx: &SimContext, pin: PinId, direction: PinDirection) {
        self.pin(pin).direction.store(direction as u8, Ordering::Release);
        self.dispatch(ctx, pin, GpioEventKind::SetDirection);
    }

    /// 设置复用功能，不发出事件
    pub fn set_function(&self, pin: PinId, function: PinFunction) {
        self.pin(pin).function.store(function as u8, Ordering::Release);
    }

    pub fn function(&self, pin: PinId) -> PinFunction {
        PinFunction::from_u8(self.pin(pin).function.load(Ordering::Acquire))
    }

    pub fn direction(&self, pin: PinId) -> PinDirection {
        PinDirection::from_u8(self.pin(pin).direction.load(Ordering::Acquire))
    }

    pub fn pull(&self, pin: PinId) -> PullMode {
        PullMode::from_u8(self.pin(pin).pull.load(Ordering::Acquire))
    }

    // ========================================================================
    // 历史记录
    // ========================================================================

    pub fn logging_enabled(&self) -> bool {
        self.logging.load(Ordering::Acquire)
    }

    /// 开关历史记录
    ///
    /// 从关闭切换到开启时，清空所有引脚的记录并以当前数值作为第一条。
    pub fn set_logging_enabled(&self, time: &TimeBase, enabled: bool) {
        if enabled && !self.logging_enabled() {
            self.reset_logs(time);
        }
        self.logging.store(enabled, Ordering::Release);
    }

    /// 清空记录，每个引脚以当前数值作为第一条
    pub fn reset_logs(&self, time: &TimeBase) {
        let now = time.now_nanos();
        for pin in self.pins.iter() {
            let mut log = pin.log.lock();
            log.clear();
            log.push_back(PinLogEntry {
                timestamp_nanos: now,
                value: pin.value.load(Ordering::Acquire),
            });
        }
    }

    pub fn log_len(&self, pin: PinId) -> usize {
        self.pin(pin).log.lock().len()
    }

    /// 复制某个引脚的历史记录，供界面线程使用
    pub fn log_snapshot(&self, pin: PinId) -> Vec<PinLogEntry> {
        self.pin(pin).log.lock().iter().copied().collect()
    }

    pub fn log_capacity(&self) -> usize {
        self.log_capacity
    }

    fn record(&self, time: &TimeBase, pin: PinId, value: u16) {
        if !self.logging_enabled() {
            return;
        }
        let entry = PinLogEntry {
            timestamp_nanos: time.now_nanos(),
            value,
        };
        let mut log = self.pin(pin).log.lock();
        log.push_back(entry);
        while log.len() > self.log_capacity {
            log.pop_front();
        }
    }
}
