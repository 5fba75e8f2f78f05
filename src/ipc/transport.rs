//! # 宿主传输层
//!
//! 调度器每次迭代都会在固件线程上调用一次全部 [`TransportPump`]，
//! 把宿主 I/O 线程准备好的数据搬进固件串口，再把固件输出搬出去。
//! 搬运量受目标缓冲区剩余空间限制，从不阻塞固件线程。

use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use super::RingBuffer;
use crate::config::{MONITOR_CAPACITY, NET_PACKET_SIZE};
use crate::hal::serial::HalSerial;
use crate::kernel::SimContext;

/// 网络线程与固件线程之间的字节流缓冲区
pub type StreamBuffer = RingBuffer<u8, NET_PACKET_SIZE>;

/// 每次调度迭代执行一次的数据搬运
pub trait TransportPump: Send + Sync {
    fn pump(&self, ctx: &SimContext);
}

// ============================================================================
// 网络串口
// ============================================================================

/// 连接固件串口与网络桥接的缓冲区
pub struct NetSerialPump {
    serial: Arc<HalSerial>,
    net_rx: Arc<StreamBuffer>,
    net_tx: Arc<StreamBuffer>,
}

impl NetSerialPump {
    pub fn new(serial: Arc<HalSerial>, net_rx: Arc<StreamBuffer>, net_tx: Arc<StreamBuffer>) -> Self {
        Self { serial, net_rx, net_tx }
    }
}

impl TransportPump for NetSerialPump {
    fn pump(&self, _ctx: &SimContext) {
        let outbound = self.serial.tx_buffer().drain_into(&self.net_tx);
        let inbound = self.net_rx.drain_into(self.serial.rx_buffer());
        if outbound + inbound > 0 {
            tracing::trace!(outbound, inbound, "net serial pumped");
        }
    }
}

// ============================================================================
// 串口监视器
// ============================================================================

/// 把串口输出收集成文本，供界面线程读取
///
/// 超过容量时丢弃最早的字节。
pub struct MonitorPump {
    serial: Arc<HalSerial>,
    capture: Mutex<VecDeque<u8>>,
    capacity: usize,
}

impl MonitorPump {
    pub fn new(serial: Arc<HalSerial>) -> Self {
        Self::with_capacity(serial, MONITOR_CAPACITY)
    }

    pub fn with_capacity(serial: Arc<HalSerial>, capacity: usize) -> Self {
        Self {
            serial,
            capture: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.capture.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contents(&self) -> String {
        let capture = self.capture.lock();
        let (head, tail) = capture.as_slices();
        let mut bytes = Vec::with_capacity(capture.len());
        bytes.extend_from_slice(head);
        bytes.extend_from_slice(tail);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// 取出并清空已收集的文本
    pub fn take(&self) -> String {
        let bytes: Vec<u8> = self.capture.lock().drain(..).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl TransportPump for MonitorPump {
    fn pump(&self, _ctx: &SimContext) {
        let mut chunk = [0u8; 256];
        loop {
            let count = self.serial.host_read(&mut chunk);
            if count == 0 {
                break;
            }
            let mut capture = self.capture.lock();
            capture.extend(&chunk[..count]);
            let excess = capture.len().saturating_sub(self.capacity);
            capture.drain(..excess);
        }
    }
}
