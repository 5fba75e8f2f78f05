//! # 环形缓冲区
//!
//! 固定容量的 FIFO，用于仿真线程与网络线程之间交换串口数据。
//!
//! ## 功能特性
//!
//! - 容量 `N` 必须是 2 的幂，可用空间为 `N - 1`
//! - 写满后拒绝写入，不覆盖旧数据
//! - 批量读写在回绕处拆成两段拷贝
//!
//! ## 使用示例
//!
//! ```rust
//! use neon_sim::ipc::RingBuffer;
//!
//! let rb: RingBuffer<u8, 8> = RingBuffer::new();
//! assert_eq!(rb.write_slice(b"hello world"), 7);
//! let mut out = [0u8; 4];
//! assert_eq!(rb.read_slice(&mut out), 4);
//! assert_eq!(&out, b"hell");
//! assert_eq!(rb.available(), 3);
//! ```

use spin::Mutex;

struct Inner<T, const N: usize> {
    buffer: [T; N],
    read_index: usize,
    write_index: usize,
}

impl<T, const N: usize> Inner<T, N> {
    const MASK: usize = N - 1;

    fn available(&self) -> usize {
        self.write_index.wrapping_sub(self.read_index) & Self::MASK
    }

    fn free(&self) -> usize {
        N - 1 - self.available()
    }
}

pub struct RingBuffer<T, const N: usize> {
    inner: Mutex<Inner<T, N>>,
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        const { assert!(N >= 2 && N.is_power_of_two(), "ring buffer size must be a power of two") };
        Self {
            inner: Mutex::new(Inner {
                buffer: [T::default(); N],
                read_index: 0,
                write_index: 0,
            }),
        }
    }

    /// 可容纳的最大元素数
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub const fn size(&self) -> usize {
        self.capacity()
    }

    /// 可读元素数
    pub fn available(&self) -> usize {
        self.inner.lock().available()
    }

    /// 可写元素数
    pub fn free(&self) -> usize {
        self.inner.lock().free()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.read_index = inner.write_index;
    }

    pub fn peek(&self) -> Option<T> {
        let inner = self.inner.lock();
        (inner.available() > 0).then(|| inner.buffer[inner.read_index])
    }

    pub fn read(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.available() == 0 {
            return None;
        }
        let value = inner.buffer[inner.read_index];
        inner.read_index = (inner.read_index + 1) & Inner::<T, N>::MASK;
        Some(value)
    }

    /// 写入一个元素
    ///
    /// # 返回值
    /// - `true`: 写入成功
    /// - `false`: 缓冲区已满
    pub fn write(&self, value: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.free() == 0 {
            return false;
        }
        let index = inner.write_index;
        inner.buffer[index] = value;
        inner.write_index = (index + 1) & Inner::<T, N>::MASK;
        true
    }

    /// 读取最多 `out.len()` 个元素，返回实际读取数
    pub fn read_slice(&self, out: &mut [T]) -> usize {
        let mut inner = self.inner.lock();
        let count = out.len().min(inner.available());
        let start = inner.read_index;
        let first = count.min(N - start);
        out[..first].copy_from_slice(&inner.buffer[start..start + first]);
        out[first..count].copy_from_slice(&inner.buffer[..count - first]);
        inner.read_index = (start + count) & Inner::<T, N>::MASK;
        count
    }

    /// 写入尽可能多的元素，返回实际写入数
    pub fn write_slice(&self, data: &[T]) -> usize {
        let mut inner = self.inner.lock();
        let count = data.len().min(inner.free());
        let start = inner.write_index;
        let first = count.min(N - start);
        inner.buffer[start..start + first].copy_from_slice(&data[..first]);
        inner.buffer[..count - first].copy_from_slice(&data[first..count]);
        inner.write_index = (start + count) & Inner::<T, N>::MASK;
        count
    }

    /// 搬运到另一个缓冲区，受目标剩余空间限制，返回搬运数
    ///
    /// 两个缓冲区不会同时加锁。
    pub fn drain_into<const M: usize>(&self, target: &RingBuffer<T, M>) -> usize {
        let mut chunk = [T::default(); DRAIN_CHUNK];
        let mut moved = 0;
        loop {
            let count = self.available().min(target.free()).min(DRAIN_CHUNK);
            if count == 0 {
                break;
            }
            let read = self.read_slice(&mut chunk[..count]);
            let written = target.write_slice(&chunk[..read]);
            moved += written;
            if written < count {
                break;
            }
        }
        moved
    }
}

const DRAIN_CHUNK: usize = 256;

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
