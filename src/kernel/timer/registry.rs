//! 定时器注册表
//!
//! 槽位数量在创建时固定，`TimerId` 即槽位下标。
//! 定时器状态与回调分开加锁，调度器在调用回调前会释放所有锁。

use std::sync::Arc;

use spin::{Mutex, RwLock};

use super::{IsrPriority, VirtualTimer};
use crate::error::{Result, SimError};
use crate::kernel::context::SimContext;

/// 中断服务回调
///
/// 回调可以嵌套调用 `delay_cycles`、`yield_now` 等操作，
/// 返回的错误（通常是退出请求）会向外传播。
pub type Isr = Arc<dyn Fn(&SimContext) -> Result<()> + Send + Sync>;

/// 定时器句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(usize);

impl TimerId {
    pub const fn new(index: usize) -> Self {
        TimerId(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

/// 定时器描述，用于创建注册表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSpec {
    pub name: String,
    pub priority: IsrPriority,
}

impl TimerSpec {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority: IsrPriority::new(priority),
        }
    }
}

struct TimerSlot {
    state: Mutex<VirtualTimer>,
    isr: RwLock<Option<Isr>>,
}

pub struct TimerRegistry {
    slots: Vec<TimerSlot>,
}

impl TimerRegistry {
    pub fn new(specs: &[TimerSpec]) -> Self {
        let slots = specs
            .iter()
            .map(|spec| TimerSlot {
                state: Mutex::new(VirtualTimer::new(spec.name.clone(), spec.priority)),
                isr: RwLock::new(None),
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TimerId> + use<> {
        (0..self.slots.len()).map(TimerId)
    }

    /// 按名称查找定时器
    pub fn find(&self, name: &str) -> Option<TimerId> {
        self.slots
            .iter()
            .position(|slot| slot.state.lock().name() == name)
            .map(TimerId)
    }

    fn slot(&self, id: TimerId) -> Result<&TimerSlot> {
        self.slots.get(id.0).ok_or(SimError::TimerNotFound(id.0))
    }

    /// 在持有状态锁的情况下访问定时器
    ///
    /// 闭包内不能调用任何可能回到注册表的操作。
    pub(crate) fn with_timer<R>(
        &self,
        id: TimerId,
        f: impl FnOnce(&mut VirtualTimer) -> R,
    ) -> Result<R> {
        let slot = self.slot(id)?;
        let mut state = slot.state.lock();
        Ok(f(&mut state))
    }

    /// 获取定时器状态快照
    pub fn snapshot(&self, id: TimerId) -> Result<VirtualTimer> {
        self.with_timer(id, |timer| timer.clone())
    }

    // ========================================================================
    // 回调
    // ========================================================================

    /// 设置中断服务回调，替换之前的回调
    pub fn set_isr(
        &self,
        id: TimerId,
        isr: impl Fn(&SimContext) -> Result<()> + Send + Sync + 'static,
    ) -> Result<()> {
        *self.slot(id)?.isr.write() = Some(Arc::new(isr));
        Ok(())
    }

    /// 按名称设置中断服务回调
    pub fn set_isr_by_name(
        &self,
        name: &str,
        isr: impl Fn(&SimContext) -> Result<()> + Send + Sync + 'static,
    ) -> Result<TimerId> {
        let id = self
            .find(name)
            .ok_or_else(|| SimError::Config(format!("unknown timer: {name}")))?;
        self.set_isr(id, isr)?;
        Ok(id)
    }

    pub(crate) fn isr(&self, id: TimerId) -> Option<Isr> {
        self.slots.get(id.0).and_then(|slot| slot.isr.read().clone())
    }

    // ========================================================================
    // 固件接口
    // ========================================================================

    /// 设置定时器时钟域频率
    pub fn init(&self, id: TimerId, frequency: u64) -> Result<()> {
        if frequency == 0 {
            return Err(SimError::InvalidFrequency { timer: id.0, frequency });
        }
        self.with_timer(id, |timer| timer.init(frequency))
    }

    /// 以给定中断频率开始计时，周期起点为 `now`
    pub fn start(&self, id: TimerId, now: u64, interrupt_frequency: u64) -> Result<()> {
        if interrupt_frequency == 0 {
            return Err(SimError::InvalidFrequency {
                timer: id.0,
                frequency: interrupt_frequency,
            });
        }
        self.with_timer(id, |timer| timer.start(now, interrupt_frequency))
    }

    pub fn enable(&self, id: TimerId) -> Result<()> {
        self.with_timer(id, |timer| timer.set_enabled(true))
    }

    pub fn disable(&self, id: TimerId) -> Result<()> {
        self.with_timer(id, |timer| timer.set_enabled(false))
    }

    pub fn is_enabled(&self, id: TimerId) -> Result<bool> {
        self.with_timer(id, |timer| timer.is_enabled())
    }

    pub fn set_compare(&self, id: TimerId, compare: u64) -> Result<()> {
        self.with_timer(id, |timer| timer.set_compare(compare))
    }

    pub fn compare(&self, id: TimerId) -> Result<u64> {
        self.with_timer(id, |timer| timer.compare())
    }

    pub fn priority(&self, id: TimerId) -> Result<IsrPriority> {
        self.with_timer(id, |timer| timer.priority())
    }

    pub fn next_interrupt(&self, id: TimerId, source_frequency: u64) -> Result<Option<u64>> {
        self.with_timer(id, |timer| timer.next_interrupt(source_frequency))
    }

    // ========================================================================
    // 宿主接口
    // ========================================================================

    /// 宿主屏蔽或恢复定时器
    pub fn set_host_masked(&self, id: TimerId, masked: bool) -> Result<()> {
        self.with_timer(id, |timer| timer.set_masked(masked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TICK_FREQUENCY;

    fn registry() -> TimerRegistry {
        TimerRegistry::new(&[TimerSpec::new("fast", 1), TimerSpec::new("slow", 20)])
    }

    #[test]
    fn test_find_by_name() {
        let timers = registry();
        assert_eq!(timers.len(), 2);
        assert_eq!(timers.find("slow"), Some(TimerId::new(1)));
        assert_eq!(timers.find("missing"), None);
    }

    #[test]
    fn test_unknown_timer() {
        let timers = registry();
        let bogus = TimerId::new(9);
        assert_eq!(timers.enable(bogus), Err(SimError::TimerNotFound(9)));
        assert!(timers.isr(bogus).is_none());
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let timers = registry();
        let id = TimerId::new(0);
        assert!(matches!(
            timers.init(id, 0),
            Err(SimError::InvalidFrequency { timer: 0, frequency: 0 })
        ));
        timers.init(id, 1_000).unwrap();
        assert!(timers.start(id, 0, 0).is_err());
    }

    #[test]
    fn test_lifecycle() {
        let timers = registry();
        let id = TimerId::new(0);
        timers.init(id, 1_000_000).unwrap();
        timers.start(id, 10, 1_000).unwrap();
        assert_eq!(timers.next_interrupt(id, TICK_FREQUENCY).unwrap(), None);
        timers.enable(id).unwrap();
        assert!(timers.is_enabled(id).unwrap());
        assert_eq!(timers.compare(id).unwrap(), 1_000);
        assert_eq!(timers.next_interrupt(id, TICK_FREQUENCY).unwrap(), Some(100_010));
        timers.set_compare(id, 50).unwrap();
        assert_eq!(timers.next_interrupt(id, TICK_FREQUENCY).unwrap(), Some(5_010));
        timers.disable(id).unwrap();
        assert!(!timers.is_enabled(id).unwrap());
    }

    #[test]
    fn test_host_mask() {
        let timers = registry();
        let id = TimerId::new(1);
        timers.set_host_masked(id, true).unwrap();
        assert!(timers.snapshot(id).unwrap().is_masked());
    }

    #[test]
    fn test_set_isr_by_name() {
        let timers = registry();
        let id = timers.set_isr_by_name("slow", |_ctx| Ok(())).unwrap();
        assert_eq!(id, TimerId::new(1));
        assert!(timers.isr(id).is_some());
        assert!(matches!(
            timers.set_isr_by_name("missing", |_ctx| Ok(())),
            Err(SimError::Config(_))
        ));
    }
}
