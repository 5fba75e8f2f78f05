//! # 虚拟定时器
//!
//! 每个虚拟定时器有自己的时钟域频率、比较值和优先级。
//! 下一次中断时刻由 `source_offset + 换算(compare)` 得出，调度器据此派发中断。
//!
//! ## 模块结构
//!
//! - [`VirtualTimer`]: 单个定时器的状态
//! - [`TimerRegistry`]: 固定数量的定时器槽位与中断回调
//! - [`IsrPriority`]: 中断优先级
//! - [`timer_layout!`](crate::timer_layout): 声明具名定时器布局

mod layout;
mod priority;
mod registry;

pub use layout::{
    FIRMWARE_LOOP_TIMER, STEPPER_TIMER, SYSTICK_TIMER, TEMPERATURE_TIMER, default_layout_specs,
};
pub use priority::IsrPriority;
pub use registry::{Isr, TimerId, TimerRegistry, TimerSpec};

use crate::kernel::time::convert_frequency;

/// 单个虚拟定时器
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualTimer {
    name: String,
    priority: IsrPriority,
    /// 固件使能
    enabled: bool,
    /// 中断正在执行，禁止重入
    running: bool,
    /// 宿主屏蔽，屏蔽后不会派发
    masked: bool,
    /// 比较值，单位为本定时器时钟域的计数
    compare: u64,
    /// 当前周期起点，单位为全局 tick
    source_offset: u64,
    /// 本定时器时钟域频率，0 表示未初始化
    frequency: u64,
}

impl VirtualTimer {
    pub fn new(name: impl Into<String>, priority: IsrPriority) -> Self {
        Self {
            name: name.into(),
            priority,
            enabled: false,
            running: false,
            masked: false,
            compare: 0,
            source_offset: 0,
            frequency: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> IsrPriority {
        self.priority
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn compare(&self) -> u64 {
        self.compare
    }

    pub fn source_offset(&self) -> u64 {
        self.source_offset
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_masked(&self) -> bool {
        self.masked
    }

    pub(crate) fn init(&mut self, frequency: u64) {
        self.frequency = frequency;
    }

    /// 以 `interrupt_frequency` 的中断频率开始计时
    pub(crate) fn start(&mut self, source_ticks: u64, interrupt_frequency: u64) {
        self.compare = self.frequency / interrupt_frequency;
        self.source_offset = source_ticks;
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub(crate) fn set_masked(&mut self, masked: bool) {
        self.masked = masked;
    }

    pub(crate) fn set_compare(&mut self, compare: u64) {
        self.compare = compare;
    }

    pub(crate) fn set_source_offset(&mut self, offset: u64) {
        self.source_offset = offset;
    }

    /// 下一次中断的全局 tick
    ///
    /// 未使能或未初始化时返回 `None`，即永不触发。
    pub fn next_interrupt(&self, source_frequency: u64) -> Option<u64> {
        if !self.enabled || self.frequency == 0 {
            return None;
        }
        let period = convert_frequency(self.compare, self.frequency, source_frequency);
        Some(self.source_offset.saturating_add(period))
    }

    /// 本周期内已经过的计数，单位为本定时器时钟域
    pub fn count(&self, source_ticks: u64, source_frequency: u64) -> u64 {
        convert_frequency(
            source_ticks.saturating_sub(self.source_offset),
            source_frequency,
            self.frequency,
        )
    }

    /// 在当前优先级为 `current` 时是否可以被派发
    pub fn is_dispatchable(&self, current: IsrPriority) -> bool {
        self.enabled && !self.running && !self.masked && self.priority.preempts(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TICK_FREQUENCY;

    fn timer() -> VirtualTimer {
        let mut timer = VirtualTimer::new("test", IsrPriority::new(3));
        timer.init(1_000_000);
        timer
    }

    #[test]
    fn test_disabled_never_fires() {
        let mut timer = timer();
        timer.start(0, 1000);
        assert_eq!(timer.next_interrupt(TICK_FREQUENCY), None);
        timer.set_enabled(true);
        assert_eq!(timer.next_interrupt(TICK_FREQUENCY), Some(100_000));
    }

    #[test]
    fn test_uninitialised_never_fires() {
        let mut timer = VirtualTimer::new("raw", IsrPriority::new(1));
        timer.set_enabled(true);
        assert_eq!(timer.next_interrupt(TICK_FREQUENCY), None);
    }

    #[test]
    fn test_start_sets_period_and_offset() {
        let mut timer = timer();
        timer.start(5_000, 500);
        timer.set_enabled(true);
        assert_eq!(timer.compare(), 2_000);
        assert_eq!(timer.source_offset(), 5_000);
        // 2000 us = 200_000 tick
        assert_eq!(timer.next_interrupt(TICK_FREQUENCY), Some(205_000));
    }

    #[test]
    fn test_count_in_timer_domain() {
        let mut timer = timer();
        timer.start(1_000, 10);
        assert_eq!(timer.count(1_000, TICK_FREQUENCY), 0);
        assert_eq!(timer.count(1_100, TICK_FREQUENCY), 1);
        assert_eq!(timer.count(500, TICK_FREQUENCY), 0);
    }

    #[test]
    fn test_dispatchable() {
        let mut timer = timer();
        assert!(!timer.is_dispatchable(IsrPriority::LOWEST));
        timer.set_enabled(true);
        assert!(timer.is_dispatchable(IsrPriority::LOWEST));
        assert!(!timer.is_dispatchable(IsrPriority::new(3)));
        timer.set_running(true);
        assert!(!timer.is_dispatchable(IsrPriority::LOWEST));
        timer.set_running(false);
        timer.set_masked(true);
        assert!(!timer.is_dispatchable(IsrPriority::LOWEST));
    }
}
