//! 中断优先级定义
//!
//! 提供中断优先级类型，用于抢占判断。

/// 虚拟中断优先级
///
/// 数值越小，优先级越高。空中断栈对应 [`IsrPriority::LOWEST`]。
///
/// # 示例
/// ```rust
/// use neon_sim::kernel::timer::IsrPriority;
///
/// let stepper = IsrPriority::new(1);
/// let temperature = IsrPriority::new(10);
/// assert!(stepper.preempts(temperature));
/// assert!(!temperature.preempts(stepper));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsrPriority(u32);

impl IsrPriority {
    /// 最高优先级
    pub const HIGHEST: IsrPriority = IsrPriority(0);

    /// 最低优先级
    ///
    /// 没有中断在运行时的当前优先级，任何定时器都可以抢占
    pub const LOWEST: IsrPriority = IsrPriority(u32::MAX);

    pub const fn new(value: u32) -> Self {
        IsrPriority(value)
    }

    /// 获取优先级数值
    pub const fn value(self) -> u32 {
        self.0
    }

    /// 检查是否能抢占 `current`
    ///
    /// 只有数值严格更小时才能抢占，同级不抢占。
    pub fn preempts(self, current: IsrPriority) -> bool {
        self.0 < current.0
    }

    /// 检查是否为最低优先级
    pub fn is_lowest(self) -> bool {
        self == IsrPriority::LOWEST
    }
}

impl Default for IsrPriority {
    fn default() -> Self {
        IsrPriority::LOWEST
    }
}

impl From<u32> for IsrPriority {
    fn from(value: u32) -> Self {
        IsrPriority(value)
    }
}
