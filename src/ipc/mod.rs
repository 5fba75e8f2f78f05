//! # 线程间数据交换
//!
//! - [`RingBuffer`]: 固定容量的并发环形缓冲区
//! - [`transport`]: 调度器每次迭代执行的宿主数据搬运

pub mod ring_buffer;
pub mod transport;

// 重新导出常用类型
pub use ring_buffer::RingBuffer;
pub use transport::{MonitorPump, NetSerialPump, StreamBuffer, TransportPump};
