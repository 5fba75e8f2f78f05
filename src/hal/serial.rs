//! # 固件串口
//!
//! 每个逻辑串口由一对环形缓冲区组成：
//!
//! - `rx`: 宿主写入，固件读取
//! - `tx`: 固件写入，宿主读取
//!
//! 固件侧的阻塞操作（发送缓冲区满、等待发送完成）通过让出调度器实现，
//! 期间其他虚拟中断照常执行。

use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::SERIAL_BUFFER_SIZE;
use crate::error::Result;
use crate::ipc::RingBuffer;
use crate::kernel::SimContext;

pub type SerialBuffer = RingBuffer<u8, SERIAL_BUFFER_SIZE>;

/// `available_for_write` 的上限
const WRITE_WINDOW: usize = 255;

pub struct HalSerial {
    rx: SerialBuffer,
    tx: SerialBuffer,
    host_connected: AtomicBool,
}

impl HalSerial {
    pub fn new() -> Self {
        Self {
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
            host_connected: AtomicBool::new(true),
        }
    }

    // ========================================================================
    // 固件侧
    // ========================================================================

    pub fn read(&self) -> Option<u8> {
        self.rx.read()
    }

    pub fn peek(&self) -> Option<u8> {
        self.rx.peek()
    }

    pub fn available(&self) -> usize {
        self.rx.available()
    }

    /// 发送一个字节
    ///
    /// 发送缓冲区满时让出调度器直到有空间。宿主未连接时丢弃数据。
    ///
    /// # 返回值
    /// - `Ok(1)`: 已写入
    /// - `Ok(0)`: 宿主未连接
    /// - `Err(SimError::QuitRequested)`: 等待期间收到退出请求
    pub fn write(&self, ctx: &SimContext, byte: u8) -> Result<usize> {
        if !self.connected() {
            return Ok(0);
        }
        while !self.tx.write(byte) {
            ctx.yield_now()?;
        }
        Ok(1)
    }

    pub fn write_bytes(&self, ctx: &SimContext, bytes: &[u8]) -> Result<usize> {
        let mut written = 0;
        for byte in bytes {
            written += self.write(ctx, *byte)?;
        }
        Ok(written)
    }

    pub fn available_for_write(&self) -> usize {
        self.tx.free().min(WRITE_WINDOW)
    }

    /// 丢弃未读的接收数据
    pub fn flush(&self) {
        self.rx.clear();
    }

    /// 等待发送缓冲区被宿主取空
    pub fn flush_tx(&self, ctx: &SimContext) -> Result<()> {
        if !self.connected() {
            return Ok(());
        }
        while !self.tx.is_empty() {
            ctx.yield_now()?;
        }
        Ok(())
    }

    pub fn connected(&self) -> bool {
        self.host_connected.load(Ordering::Acquire)
    }

    // ========================================================================
    // 宿主侧
    // ========================================================================

    pub fn set_connected(&self, connected: bool) {
        self.host_connected.store(connected, Ordering::Release);
    }

    /// 宿主向固件发送数据，返回实际写入数
    pub fn host_write(&self, bytes: &[u8]) -> usize {
        self.rx.write_slice(bytes)
    }

    /// 宿主读取固件发出的数据
    pub fn host_read(&self, out: &mut [u8]) -> usize {
        self.tx.read_slice(out)
    }

    pub fn rx_buffer(&self) -> &SerialBuffer {
        &self.rx
    }

    pub fn tx_buffer(&self) -> &SerialBuffer {
        &self.tx
    }
}

impl Default for HalSerial {
    fn default() -> Self {
        Self::new()
    }
}
