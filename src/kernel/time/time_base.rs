//! # 时间基准
//!
//! 单调递增的 64 位虚拟 tick 计数器（100 MHz），以及把虚拟时间节流到
//! 墙上时间的实时同步逻辑。
//!
//! ## 功能特性
//!
//! - tick 只增不减，`set_ticks` 只在调度器确认不会回退时使用
//! - `nanos()` 等读取接口会推进一个轮询步进，用于模拟固件忙等
//! - `now_nanos()` 等接口没有副作用，供界面线程读取
//! - 实时倍率可以在任意线程修改，0 表示暂停，>= 99 表示不限速

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use spin::Mutex;

use super::rate::{
    MICROS_PER_SECOND, MILLIS_PER_SECOND, NANOS_PER_SECOND, convert_frequency,
    nanos_to_ticks, ticks_to_nanos,
};
use crate::config::{MAX_REALTIME_SCALE, POLL_QUANTUM_NANOS, REALTIME_UNBOUNDED, TICK_FREQUENCY};
use crate::error::Result;
use crate::kernel::control::ExecutionControl;

/// 墙上时钟状态
struct RealtimeClock {
    last_read: Instant,
    /// 按倍率折算后的实时纳秒数
    realtime_nanos: u64,
}

pub struct TimeBase {
    ticks: AtomicU64,
    frequency: u64,
    scale_bits: AtomicU32,
    realtime: Mutex<RealtimeClock>,
    control: ExecutionControl,
}

impl TimeBase {
    pub fn new(realtime_scale: f32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            frequency: TICK_FREQUENCY,
            scale_bits: AtomicU32::new(clamp_scale(realtime_scale).to_bits()),
            realtime: Mutex::new(RealtimeClock {
                last_read: Instant::now(),
                realtime_nanos: 0,
            }),
            control: ExecutionControl::new(),
        }
    }

    // ========================================================================
    // tick 访问
    // ========================================================================

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// 直接设置 tick
    ///
    /// 调用方保证 `value >= ticks()`。
    #[inline]
    pub fn set_ticks(&self, value: u64) {
        debug_assert!(value >= self.ticks(), "ticks must not move backwards");
        self.ticks.store(value, Ordering::Release);
    }

    #[inline]
    pub fn add_ticks(&self, delta: u64) {
        self.ticks.fetch_add(delta, Ordering::AcqRel);
    }

    #[inline]
    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn nanos_to_ticks(&self, nanos: u64) -> u64 {
        nanos_to_ticks(nanos, self.frequency)
    }

    pub fn ticks_to_nanos(&self, ticks: u64) -> u64 {
        ticks_to_nanos(ticks, self.frequency)
    }

    /// 一次忙等轮询推进的 tick 数
    #[inline]
    pub fn poll_quantum(&self) -> u64 {
        1 + self.nanos_to_ticks(POLL_QUANTUM_NANOS)
    }

    pub fn control(&self) -> &ExecutionControl {
        &self.control
    }

    /// 检查退出与调试中断请求
    #[inline]
    pub fn poll(&self) -> Result<()> {
        self.control.poll(self.ticks())
    }

    // ========================================================================
    // 固件读取接口（会推进时间）
    // ========================================================================

    /// 固件读取当前纳秒
    ///
    /// 推进一个轮询步进，使固件的忙等循环总能向前推进。
    pub fn nanos(&self) -> Result<u64> {
        self.poll()?;
        self.add_ticks(self.poll_quantum());
        Ok(self.now_nanos())
    }

    pub fn micros(&self) -> Result<u64> {
        Ok(self.nanos()? / (NANOS_PER_SECOND / MICROS_PER_SECOND))
    }

    pub fn millis(&self) -> Result<u64> {
        Ok(self.nanos()? / (NANOS_PER_SECOND / MILLIS_PER_SECOND))
    }

    // ========================================================================
    // 只读接口（无副作用）
    // ========================================================================

    pub fn now_nanos(&self) -> u64 {
        self.ticks_to_nanos(self.ticks())
    }

    pub fn now_micros(&self) -> u64 {
        convert_frequency(self.ticks(), self.frequency, MICROS_PER_SECOND)
    }

    pub fn now_millis(&self) -> u64 {
        convert_frequency(self.ticks(), self.frequency, MILLIS_PER_SECOND)
    }

    pub fn seconds(&self) -> f64 {
        self.ticks() as f64 / self.frequency as f64
    }

    // ========================================================================
    // 实时同步
    // ========================================================================

    pub fn realtime_scale(&self) -> f32 {
        f32::from_bits(self.scale_bits.load(Ordering::Relaxed))
    }

    /// 设置实时倍率，超出 `[0, 100]` 的值会被截断
    pub fn set_realtime_scale(&self, scale: f32) {
        self.scale_bits
            .store(clamp_scale(scale).to_bits(), Ordering::Relaxed);
    }

    /// 把虚拟时间节流到墙上时间
    ///
    /// - 实时时间领先或不限速时，把实时基准重新对齐到虚拟时间
    /// - 虚拟时间领先时让出线程，直到实时时间追上，期间持续检查退出请求
    pub fn realtime_sync(&self) -> Result<()> {
        loop {
            let scale = self.realtime_scale();
            let ticks = self.ticks();
            let realtime_ticks = self.advance_realtime(scale);

            if realtime_ticks > ticks || scale >= REALTIME_UNBOUNDED {
                self.realtime.lock().realtime_nanos = self.ticks_to_nanos(ticks);
                return Ok(());
            }
            if realtime_ticks >= ticks {
                return Ok(());
            }

            self.poll()?;
            std::thread::yield_now();
        }
    }

    /// 读取墙上时钟并累加折算后的实时纳秒，返回实时 tick
    fn advance_realtime(&self, scale: f32) -> u64 {
        let now = Instant::now();
        let mut clock = self.realtime.lock();
        // Instant 单调，时钟异常时差值饱和为 0
        let delta = now.saturating_duration_since(clock.last_read);
        let scaled = (delta.as_nanos() as f64 * scale as f64) as u64;
        // 折算结果不足 1 ns 时保留起点，低倍率下差值继续累积
        if scaled > 0 {
            clock.last_read = now;
            clock.realtime_nanos = clock.realtime_nanos.saturating_add(scaled);
        }
        self.nanos_to_ticks(clock.realtime_nanos)
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn clamp_scale(scale: f32) -> f32 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(0.0, MAX_REALTIME_SCALE)
}
