//! # SPI 总线仿真
//!
//! 总线本身不保存数据，每次传输生成一个 [`SpiEvent`] 依次交给观察者处理。
//! 没有观察者写入时读到的是空闲字节 `0xFF`。
//!
//! 16 位传输按大端序展开成字节流，与真实总线上的发送顺序一致。

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use spin::RwLock;

use super::traits::BusObserver;
use crate::config::IDLE_BYTE;
use crate::kernel::SimContext;

/// SPI 传输事件
///
/// - `write_from` 为 `None` 表示只读
/// - `read_into` 为 `None` 表示只写
/// - `source_increment` 为 `false` 时，第 `i` 个字节取 `write_from[i % source_format]`
pub struct SpiEvent<'a> {
    pub write_from: Option<&'a [u8]>,
    pub read_into: Option<&'a mut [u8]>,
    /// 传输字节数
    pub length: usize,
    pub source_increment: bool,
    /// 源数据元素宽度（字节）
    pub source_format: usize,
}

impl SpiEvent<'_> {
    /// 第 `index` 个发送字节
    pub fn source_byte(&self, index: usize) -> Option<u8> {
        let source = self.write_from?;
        if self.source_increment {
            source.get(index).copied()
        } else {
            source.get(index % self.source_format.max(1)).copied()
        }
    }

    pub fn is_read(&self) -> bool {
        self.read_into.is_some()
    }

    pub fn is_write(&self) -> bool {
        self.write_from.is_some()
    }
}

type ObserverList = Arc<Vec<Arc<dyn BusObserver>>>;

pub struct SpiBus {
    index: usize,
    busy: AtomicBool,
    contention: AtomicU64,
    observers: RwLock<ObserverList>,
}

impl SpiBus {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            busy: AtomicBool::new(false),
            contention: AtomicU64::new(0),
            observers: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 注册观察者，按注册顺序通知
    pub fn attach(&self, observer: Arc<dyn BusObserver>) {
        let mut observers = self.observers.write();
        let mut next: Vec<_> = observers.iter().cloned().collect();
        next.push(observer);
        *observers = Arc::new(next);
    }

    fn dispatch(&self, ctx: &SimContext, event: &mut SpiEvent<'_>) {
        let observers = self.observers.read().clone();
        for observer in observers.iter() {
            observer.on_spi_event(ctx, event);
        }
    }

    // ========================================================================
    // 单字节传输
    // ========================================================================

    pub fn write(&self, ctx: &SimContext, value: u8) {
        let source = [value];
        self.transfer_bytes(ctx, Some(&source), None);
    }

    pub fn read(&self, ctx: &SimContext) -> u8 {
        let mut value = [IDLE_BYTE];
        self.transfer_bytes(ctx, None, Some(&mut value));
        value[0]
    }

    pub fn transfer(&self, ctx: &SimContext, value: u8) -> u8 {
        let source = [value];
        let mut received = [IDLE_BYTE];
        self.transfer_bytes(ctx, Some(&source), Some(&mut received));
        received[0]
    }

    // ========================================================================
    // 块传输
    // ========================================================================

    /// 块传输，收发同时存在时长度取两者较小值
    pub fn transfer_bytes(
        &self,
        ctx: &SimContext,
        write_from: Option<&[u8]>,
        mut read_into: Option<&mut [u8]>,
    ) {
        let length = match (write_from, read_into.as_deref()) {
            (Some(w), Some(r)) => w.len().min(r.len()),
            (Some(w), None) => w.len(),
            (None, Some(r)) => r.len(),
            (None, None) => 0,
        };
        if let Some(buffer) = read_into.as_deref_mut() {
            buffer.fill(IDLE_BYTE);
        }
        let mut event = SpiEvent {
            write_from,
            read_into,
            length,
            source_increment: true,
            source_format: 1,
        };
        self.dispatch(ctx, &mut event);
    }

    /// 重复发送 `pattern` 共 `count` 次，不读取
    pub fn fill(&self, ctx: &SimContext, pattern: &[u8], count: usize) {
        if pattern.is_empty() {
            return;
        }
        let mut event = SpiEvent {
            write_from: Some(pattern),
            read_into: None,
            length: pattern.len() * count,
            source_increment: false,
            source_format: pattern.len(),
        };
        self.dispatch(ctx, &mut event);
    }

    /// 发送 16 位数据，每个字按大端序发送
    pub fn write_words(&self, ctx: &SimContext, words: &[u16]) {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        let mut event = SpiEvent {
            write_from: Some(&bytes),
            read_into: None,
            length: bytes.len(),
            source_increment: true,
            source_format: 2,
        };
        self.dispatch(ctx, &mut event);
    }

    /// 重复发送同一个 16 位字 `count` 次
    pub fn fill_words(&self, ctx: &SimContext, word: u16, count: usize) {
        self.fill(ctx, &word.to_be_bytes(), count);
    }

    /// 16 位全双工传输，接收数据按大端序组装
    pub fn transfer_words(&self, ctx: &SimContext, words: &[u16], read_into: &mut [u16]) {
        let length = words.len().min(read_into.len());
        let source: Vec<u8> = words[..length]
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect();
        let mut received = vec![IDLE_BYTE; length * 2];
        let mut event = SpiEvent {
            write_from: Some(&source),
            read_into: Some(&mut received),
            length: length * 2,
            source_increment: true,
            source_format: 2,
        };
        self.dispatch(ctx, &mut event);
        for (word, bytes) in read_into.iter_mut().zip(received.chunks_exact(2)) {
            *word = u16::from_be_bytes([bytes[0], bytes[1]]);
        }
    }

    // ========================================================================
    // 总线占用
    // ========================================================================

    /// 占用总线，已被占用时记录一次冲突
    pub fn acquire(&self) {
        if self.busy.swap(true, Ordering::AcqRel) {
            self.contention.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(bus = self.index, "spi bus contention");
        }
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn contention_count(&self) -> u64 {
        self.contention.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::SimBuilder;
    use spin::Mutex;

    /// 记录发送字节，并把收到的字节加一后回送
    struct Echo {
        sent: Mutex<Vec<u8>>,
    }

    impl BusObserver for Echo {
        fn on_spi_event(&self, _ctx: &SimContext, event: &mut SpiEvent<'_>) {
            for i in 0..event.length {
                let byte = event.source_byte(i);
                if let Some(byte) = byte {
                    self.sent.lock().push(byte);
                }
                if let Some(read) = event.read_into.as_deref_mut() {
                    read[i] = byte.map_or(0x00, |b| b.wrapping_add(1));
                }
            }
        }
    }

    fn setup() -> (SimContext, Arc<Echo>) {
        let ctx = SimBuilder::new().realtime_scale(100.0).build().unwrap();
        let echo = Arc::new(Echo { sent: Mutex::new(Vec::new()) });
        ctx.spi_bus(0).unwrap().attach(echo.clone());
        (ctx, echo)
    }

    #[test]
    fn test_idle_without_observer() {
        let ctx = SimBuilder::new().build().unwrap();
        let bus = ctx.spi_bus(1).unwrap();
        assert_eq!(bus.read(&ctx), 0xFF);
        assert_eq!(bus.transfer(&ctx, 0x12), 0xFF);
    }

    #[test]
    fn test_single_byte() {
        let (ctx, echo) = setup();
        let bus = ctx.spi_bus(0).unwrap();
        assert_eq!(bus.transfer(&ctx, 0x41), 0x42);
        bus.write(&ctx, 0x10);
        assert_eq!(bus.read(&ctx), 0x00);
        assert_eq!(*echo.sent.lock(), vec![0x41, 0x10]);
    }

    #[test]
    fn test_words_are_big_endian() {
        let (ctx, echo) = setup();
        let bus = ctx.spi_bus(0).unwrap();
        bus.write_words(&ctx, &[0x1234, 0xABCD]);
        assert_eq!(*echo.sent.lock(), vec![0x12, 0x34, 0xAB, 0xCD]);

        let mut received = [0u16; 1];
        bus.transfer_words(&ctx, &[0x0102], &mut received);
        assert_eq!(received[0], 0x0203);
    }

    #[test]
    fn test_fill_repeats_pattern() {
        let (ctx, echo) = setup();
        ctx.spi_bus(0).unwrap().fill_words(&ctx, 0xF800, 3);
        assert_eq!(*echo.sent.lock(), vec![0xF8, 0x00, 0xF8, 0x00, 0xF8, 0x00]);
    }

    #[test]
    fn test_contention_counted() {
        let ctx = SimBuilder::new().build().unwrap();
        let bus = ctx.spi_bus(2).unwrap();
        bus.acquire();
        assert!(bus.is_busy());
        bus.acquire();
        assert_eq!(bus.contention_count(), 1);
        bus.release();
        assert!(!bus.is_busy());
        bus.acquire();
        assert_eq!(bus.contention_count(), 1);
    }
}
