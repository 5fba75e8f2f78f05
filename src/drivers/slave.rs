//! # SPI 从设备分帧
//!
//! [`SlavePeripheral`] 把片选边沿和总线事件翻译成逐字节的回调，
//! 具体设备只需实现 [`SlaveDevice`] 中关心的回调。
//!
//! ## 事务
//!
//! - 片选下降沿开始事务：占用总线，输出字节复位为 `0xFF`
//! - 片选上升沿结束事务：未收满的请求数据按实际数量交付一次，令牌复位，释放总线
//! - 片选为高或不在事务中时忽略总线事件
//!
//! ## 请求数据
//!
//! 设备调用 [`SlaveLink::set_requested_data_size`] 声明接下来 N 个字节属于某个令牌，
//! 收满 N 个字节或事务提前结束时，`on_requested_data_received` 恰好调用一次。
//!
//! ## 引脚与时间
//!
//! 回调中可以用 [`SlaveLink::drive_pin`] 驱动忙信号、中断等引脚，写入在释放从设备锁之后
//! 按顺序生效；[`SlaveLink::now_nanos`] 给出本次事件的虚拟时间。
//!
//! ## 使用示例
//!
//! ```rust
//! use neon_sim::drivers::slave::{SlaveDevice, SlaveLink, SlavePeripheral, NO_TOKEN};
//! use neon_sim::kernel::SimBuilder;
//!
//! /// 收到 0x9F 后回送两字节 ID
//! struct IdChip;
//!
//! impl SlaveDevice for IdChip {
//!     fn on_byte_received(&mut self, link: &mut SlaveLink, byte: u8) {
//!         if link.current_token() == NO_TOKEN && byte == 0x9F {
//!             link.set_response16(0xEF40, true);
//!         }
//!     }
//! }
//!
//! let ctx = SimBuilder::new().build().unwrap();
//! let chip = SlavePeripheral::attach(&ctx, 0, 10, IdChip).unwrap();
//! let bus = ctx.spi_bus(0).unwrap();
//!
//! ctx.gpio().set(&ctx, 10, 1);
//! ctx.gpio().set(&ctx, 10, 0);
//! bus.write(&ctx, 0x9F);
//! assert_eq!(bus.read(&ctx), 0xEF);
//! assert_eq!(bus.read(&ctx), 0x40);
//! assert_eq!(bus.read(&ctx), 0xFF);
//! ctx.gpio().set(&ctx, 10, 1);
//! assert!(!chip.is_inside_transaction());
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use super::gpio::{GpioEvent, GpioEventKind, LOW, PinId};
use super::spi::SpiEvent;
use super::traits::{BusObserver, PinObserver};
use crate::config::IDLE_BYTE;
use crate::error::Result;
use crate::kernel::SimContext;

/// 没有请求数据时的令牌
pub const NO_TOKEN: u8 = 0xFF;

// ============================================================================
// 分帧状态
// ============================================================================

/// 从设备的分帧状态，设备回调通过它设置应答和请求数据
#[derive(Debug)]
pub struct SlaveLink {
    inside_transaction: bool,
    outgoing_byte: u8,
    response: VecDeque<u8>,
    has_data_to_send: bool,
    current_token: u8,
    requested: Vec<u8>,
    requested_size: usize,
    requested_index: usize,
    now_nanos: u64,
    pin_writes: Vec<(PinId, u16)>,
}

impl SlaveLink {
    fn new() -> Self {
        Self {
            inside_transaction: false,
            outgoing_byte: IDLE_BYTE,
            response: VecDeque::new(),
            has_data_to_send: false,
            current_token: NO_TOKEN,
            requested: Vec::new(),
            requested_size: 0,
            requested_index: 0,
            now_nanos: 0,
            pin_writes: Vec::new(),
        }
    }

    /// 设置应答，第一个字节在下一次读取时输出
    pub fn set_response(&mut self, bytes: &[u8]) {
        self.response.clear();
        self.response.extend(bytes.iter().copied());
        self.outgoing_byte = self.response.pop_front().unwrap_or(IDLE_BYTE);
        self.has_data_to_send = true;
    }

    pub fn set_response_byte(&mut self, byte: u8) {
        self.set_response(&[byte]);
    }

    /// 设置 16 位应答
    ///
    /// `msb_first` 为 `true` 时先发高字节。
    pub fn set_response16(&mut self, value: u16, msb_first: bool) {
        if msb_first {
            self.set_response(&value.to_be_bytes());
        } else {
            self.set_response(&value.to_le_bytes());
        }
    }

    /// 声明接下来 `count` 个字节属于 `token`
    ///
    /// 缓冲区只在长度变化时重新分配。
    pub fn set_requested_data_size(&mut self, token: u8, count: usize) {
        self.current_token = token;
        self.requested_size = count;
        self.requested_index = 0;
        if self.requested.len() != count {
            self.requested.resize(count, 0);
        }
    }

    pub fn current_token(&self) -> u8 {
        self.current_token
    }

    pub fn clear_current_token(&mut self) {
        self.current_token = NO_TOKEN;
    }

    pub fn is_inside_transaction(&self) -> bool {
        self.inside_transaction
    }

    pub fn has_data_to_send(&self) -> bool {
        self.has_data_to_send
    }

    /// 正在等待的请求数据字节数
    pub fn pending_request(&self) -> usize {
        self.requested_size.saturating_sub(self.requested_index)
    }

    pub fn outgoing_byte(&self) -> u8 {
        self.outgoing_byte
    }

    /// 当前事件发生时的虚拟时间（纳秒）
    pub fn now_nanos(&self) -> u64 {
        self.now_nanos
    }

    /// 驱动一个引脚，回调返回后生效
    pub fn drive_pin(&mut self, pin: PinId, value: u16) {
        self.pin_writes.push((pin, value));
    }
}

// ============================================================================
// 设备回调
// ============================================================================

/// SPI 从设备
///
/// 所有回调都有空的默认实现。回调在持有从设备状态锁时执行，不应访问仿真上下文。
pub trait SlaveDevice: Send + 'static {
    fn name(&self) -> &'static str {
        "spi slave"
    }

    fn on_begin_transaction(&mut self, _link: &mut SlaveLink) {}

    fn on_end_transaction(&mut self, _link: &mut SlaveLink) {}

    /// 每个收到的字节都会调用，包括被请求数据消费的字节
    fn on_byte_received(&mut self, _link: &mut SlaveLink, _byte: u8) {}

    fn on_requested_data_received(&mut self, _link: &mut SlaveLink, _token: u8, _data: &[u8]) {}

    fn on_byte_sent(&mut self, _link: &mut SlaveLink, _byte: u8) {}

    /// 应答全部发出后调用一次，可以在这里设置后续应答
    fn on_response_sent(&mut self, _link: &mut SlaveLink) {}
}

struct SlaveState<D> {
    link: SlaveLink,
    device: D,
}

impl<D: SlaveDevice> SlaveState<D> {
    fn begin(&mut self) {
        self.link.inside_transaction = true;
        self.link.outgoing_byte = IDLE_BYTE;
        self.device.on_begin_transaction(&mut self.link);
    }

    fn end(&mut self) {
        if self.link.requested_size > 0 {
            self.link.requested_size = 0;
            self.deliver_requested();
        }
        self.link.set_requested_data_size(NO_TOKEN, 0);
        self.link.response.clear();
        self.link.has_data_to_send = false;
        self.link.outgoing_byte = IDLE_BYTE;
        self.link.inside_transaction = false;
        self.device.on_end_transaction(&mut self.link);
    }

    /// 输出一个字节并推进应答
    fn send(&mut self) -> u8 {
        let byte = self.link.outgoing_byte;
        match self.link.response.pop_front() {
            Some(next) => self.link.outgoing_byte = next,
            None => {
                self.link.outgoing_byte = IDLE_BYTE;
                if self.link.has_data_to_send {
                    self.link.has_data_to_send = false;
                    self.device.on_response_sent(&mut self.link);
                }
            }
        }
        self.device.on_byte_sent(&mut self.link, byte);
        byte
    }

    fn receive(&mut self, byte: u8) {
        let link = &mut self.link;
        if link.requested_size > 0 {
            link.requested[link.requested_index] = byte;
            link.requested_index += 1;
            if link.requested_index == link.requested_size {
                link.requested_size = 0;
                self.deliver_requested();
            }
        }
        self.device.on_byte_received(&mut self.link, byte);
    }

    fn deliver_requested(&mut self) {
        let count = self.link.requested_index;
        let token = self.link.current_token;
        let data = core::mem::take(&mut self.link.requested);
        self.device
            .on_requested_data_received(&mut self.link, token, &data[..count]);
        // 回调没有重新申请时归还缓冲区
        if self.link.requested.is_empty() {
            self.link.requested = data;
        }
    }
}

// ============================================================================
// 从设备
// ============================================================================

pub struct SlavePeripheral<D: SlaveDevice> {
    bus: usize,
    cs_pin: PinId,
    state: Mutex<SlaveState<D>>,
}

impl<D: SlaveDevice> SlavePeripheral<D> {
    /// 创建从设备并挂到片选引脚和总线上
    ///
    /// # 返回值
    /// - `Ok(Arc<SlavePeripheral>)`: 挂载成功
    /// - `Err(SimError::BusNotFound)`: 总线不存在
    pub fn attach(ctx: &SimContext, bus: usize, cs_pin: PinId, device: D) -> Result<Arc<Self>> {
        let spi = ctx.spi_bus(bus)?;
        let peripheral = Arc::new(Self {
            bus,
            cs_pin,
            state: Mutex::new(SlaveState {
                link: SlaveLink::new(),
                device,
            }),
        });
        ctx.gpio().attach(cs_pin, peripheral.clone());
        spi.attach(peripheral.clone());
        Ok(peripheral)
    }

    pub fn cs_pin(&self) -> PinId {
        self.cs_pin
    }

    pub fn bus(&self) -> usize {
        self.bus
    }

    pub fn is_inside_transaction(&self) -> bool {
        self.state.lock().link.inside_transaction
    }

    /// 访问设备模型
    pub fn with_device<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.state.lock().device)
    }

    fn begin_transaction(&self, ctx: &SimContext) {
        if let Ok(bus) = ctx.spi_bus(self.bus) {
            bus.acquire();
        }
        let writes = {
            let mut state = self.state.lock();
            state.link.now_nanos = ctx.time().now_nanos();
            tracing::debug!(device = state.device.name(), cs = self.cs_pin, bus = self.bus, "transaction begin");
            state.begin();
            core::mem::take(&mut state.link.pin_writes)
        };
        apply_pin_writes(ctx, writes);
    }

    fn end_transaction(&self, ctx: &SimContext) {
        let writes = {
            let mut state = self.state.lock();
            state.link.now_nanos = ctx.time().now_nanos();
            state.end();
            tracing::debug!(device = state.device.name(), cs = self.cs_pin, bus = self.bus, "transaction end");
            core::mem::take(&mut state.link.pin_writes)
        };
        if let Ok(bus) = ctx.spi_bus(self.bus) {
            bus.release();
        }
        apply_pin_writes(ctx, writes);
    }
}

/// 在不持有从设备锁的情况下应用回调驱动的引脚
fn apply_pin_writes(ctx: &SimContext, writes: Vec<(PinId, u16)>) {
    for (pin, value) in writes {
        ctx.gpio().set(ctx, pin, value);
    }
}

impl<D: SlaveDevice> PinObserver for SlavePeripheral<D> {
    fn on_gpio_event(&self, ctx: &SimContext, event: &GpioEvent) {
        if event.pin != self.cs_pin {
            return;
        }
        match event.kind {
            GpioEventKind::Fall => self.begin_transaction(ctx),
            GpioEventKind::Rise if self.is_inside_transaction() => self.end_transaction(ctx),
            _ => {}
        }
    }
}

impl<D: SlaveDevice> BusObserver for SlavePeripheral<D> {
    fn on_spi_event(&self, ctx: &SimContext, event: &mut SpiEvent<'_>) {
        if ctx.gpio().value(self.cs_pin) != LOW {
            return;
        }
        let writes = {
            let mut state = self.state.lock();
            if !state.link.inside_transaction {
                return;
            }
            state.link.now_nanos = ctx.time().now_nanos();
            for i in 0..event.length {
                if let Some(read) = event.read_into.as_deref_mut() {
                    if i < read.len() {
                        read[i] = state.send();
                    }
                }
                if let Some(byte) = event.source_byte(i) {
                    state.receive(byte);
                }
            }
            core::mem::take(&mut state.link.pin_writes)
        };
        apply_pin_writes(ctx, writes);
    }
}
