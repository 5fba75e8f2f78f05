//! # 虚拟中断调度器
//!
//! 可重入的优先级抢占式调度器。所有虚拟时间都在调用它的线程上推进，
//! 中断服务回调直接在调用者的栈上执行，回调内部可以再次进入调度器。
//!
//! ## 派发规则
//!
//! 一次 `execute_loop(bound)` 最多派发一个中断，候选定时器必须：
//! - 已使能、未在运行、未被宿主屏蔽
//! - 优先级数值严格小于当前栈顶优先级
//! - 下一次中断时刻不晚于 `bound`
//!
//! 多个候选时取最早触发的，时刻相同时取注册表中靠前的。
//!
//! ## 迟到处理
//!
//! 如果派发时当前 tick 已经越过了触发时刻，周期起点重置为当前 tick，
//! 不补发错过的周期。高优先级中断持续占用时，低优先级中断会一直被推后。

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use crate::config::{LATE_WARNING_NANOS, POLL_QUANTUM_NANOS};
use crate::error::{Result, SimError};
use crate::kernel::context::SimContext;
use crate::kernel::timer::{IsrPriority, TimerId};

/// 调度统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    /// 派发总数
    pub dispatched: u64,
    /// 迟到派发次数
    pub late: u64,
    /// 最近一次派发的时间误差（纳秒），准时为 0
    pub last_timing_error_nanos: u64,
    /// 观察到的最大嵌套深度
    pub max_depth: usize,
}

pub struct Scheduler {
    /// 正在执行的中断栈，栈顶为当前中断
    stack: Mutex<Vec<TimerId>>,
    interrupts_enabled: AtomicBool,
    started: AtomicBool,
    dispatched: AtomicU64,
    late: AtomicU64,
    last_timing_error: AtomicU64,
    max_depth: AtomicUsize,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            stack: Mutex::new(Vec::new()),
            interrupts_enabled: AtomicBool::new(true),
            started: AtomicBool::new(false),
            dispatched: AtomicU64::new(0),
            late: AtomicU64::new(0),
            last_timing_error: AtomicU64::new(0),
            max_depth: AtomicUsize::new(0),
        }
    }

    /// 标记内核已启动
    ///
    /// 启动前 `delay_cycles` 只推进时间，不派发中断。
    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    // ========================================================================
    // 全局中断开关
    // ========================================================================

    pub fn enable_interrupts(&self) {
        self.interrupts_enabled.store(true, Ordering::Release);
    }

    /// 关闭全局中断，期间 `execute_loop` 不派发任何中断
    pub fn disable_interrupts(&self) {
        self.interrupts_enabled.store(false, Ordering::Release);
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.load(Ordering::Acquire)
    }

    // ========================================================================
    // 查询
    // ========================================================================

    /// 当前正在执行的中断
    pub fn current_timer(&self) -> Option<TimerId> {
        self.stack.lock().last().copied()
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    pub fn stack_snapshot(&self) -> Vec<TimerId> {
        self.stack.lock().clone()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            late: self.late.load(Ordering::Relaxed),
            last_timing_error_nanos: self.last_timing_error.load(Ordering::Relaxed),
            max_depth: self.max_depth.load(Ordering::Relaxed),
        }
    }

    /// 当前优先级，空栈为最低优先级
    pub fn current_priority(&self, ctx: &SimContext) -> IsrPriority {
        self.current_timer()
            .and_then(|id| ctx.timers().priority(id).ok())
            .unwrap_or(IsrPriority::LOWEST)
    }

    // ========================================================================
    // 核心调度
    // ========================================================================

    /// 一次调度迭代
    ///
    /// 依次检查退出请求、实时同步、搬运传输层数据，最后最多派发一个中断。
    ///
    /// # 返回值
    /// - `Ok(true)`: 派发了一个中断
    /// - `Ok(false)`: 没有符合条件的中断
    /// - `Err(_)`: 退出请求或中断回调返回的错误
    pub fn execute_loop(&self, ctx: &SimContext, bound: u64) -> Result<bool> {
        let time = ctx.time();
        time.poll()?;
        time.realtime_sync()?;
        ctx.pump_transports();

        if !self.interrupts_enabled() {
            return Ok(false);
        }

        match self.select(ctx, bound) {
            Some((id, fire)) => {
                self.dispatch(ctx, id, fire)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 推进 `cycles` 个 tick，期间派发所有到期的中断
    pub fn delay_cycles(&self, ctx: &SimContext, cycles: u64) -> Result<()> {
        let time = ctx.time();
        if !self.is_started() {
            time.poll()?;
            time.add_ticks(cycles);
            return Ok(());
        }

        let end = time.ticks().saturating_add(cycles);
        while self.execute_loop(ctx, end)? && time.ticks() < end {}
        if time.ticks() < end {
            time.set_ticks(end);
        }
        Ok(())
    }

    /// 让出执行权
    ///
    /// 在中断内调用时，推进到当前中断的下一个周期，期间可以派发更高优先级的中断。
    /// 不在中断内时只推进一个轮询步进。
    pub fn yield_now(&self, ctx: &SimContext) -> Result<()> {
        let time = ctx.time();
        time.poll()?;

        let top = if self.is_started() {
            self.current_timer()
        } else {
            None
        };
        let bound = match top {
            Some(id) => ctx.timers().next_interrupt(id, time.frequency())?,
            None => None,
        };
        let (Some(top), Some(bound)) = (top, bound) else {
            time.add_ticks(time.nanos_to_ticks(POLL_QUANTUM_NANOS));
            return Ok(());
        };

        if !self.execute_loop(ctx, bound)? {
            let target = bound.max(time.ticks());
            time.set_ticks(target);
            ctx.timers()
                .with_timer(top, |timer| timer.set_source_offset(target))?;
        }
        Ok(())
    }

    /// 顶层驱动循环
    ///
    /// 一直调度到收到退出请求为止，退出请求视为正常结束。
    pub fn run(&self, ctx: &SimContext) -> Result<()> {
        self.start();
        tracing::info!(timers = ctx.timers().len(), "simulation started");
        loop {
            match self.execute_loop(ctx, u64::MAX) {
                Ok(true) => {}
                Ok(false) => std::thread::yield_now(),
                Err(SimError::QuitRequested) => {
                    tracing::info!(
                        tick = ctx.time().ticks(),
                        "quit requested, simulation stopped"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!("simulation aborted: {}", e);
                    return Err(e);
                }
            }
        }
    }

    // ========================================================================
    // 内部实现
    // ========================================================================

    fn select(&self, ctx: &SimContext, bound: u64) -> Option<(TimerId, u64)> {
        let current = self.current_priority(ctx);
        let frequency = ctx.time().frequency();
        let timers = ctx.timers();

        let mut best: Option<(TimerId, u64)> = None;
        for id in timers.ids() {
            let fire = timers
                .with_timer(id, |timer| {
                    if timer.is_dispatchable(current) {
                        timer.next_interrupt(frequency)
                    } else {
                        None
                    }
                })
                .ok()
                .flatten();
            if let Some(fire) = fire {
                if fire <= bound && best.is_none_or(|(_, earliest)| fire < earliest) {
                    best = Some((id, fire));
                }
            }
        }
        best
    }

    fn dispatch(&self, ctx: &SimContext, id: TimerId, fire: u64) -> Result<()> {
        let time = ctx.time();
        let now = time.ticks();
        let offset = if now > fire {
            let error = time.ticks_to_nanos(now - fire);
            self.late.fetch_add(1, Ordering::Relaxed);
            self.last_timing_error.store(error, Ordering::Relaxed);
            if error >= LATE_WARNING_NANOS {
                tracing::warn!(timer = id.index(), late_ns = error, "interrupt dispatched late");
            }
            now
        } else {
            self.last_timing_error.store(0, Ordering::Relaxed);
            fire
        };

        ctx.timers().with_timer(id, |timer| {
            timer.set_source_offset(offset);
            timer.set_running(true);
        })?;
        time.set_ticks(offset);

        let depth = {
            let mut stack = self.stack.lock();
            stack.push(id);
            stack.len()
        };
        self.max_depth.fetch_max(depth, Ordering::Relaxed);
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(timer = id.index(), tick = offset, depth, "dispatch");

        let _frame = IsrFrame { ctx, id };
        match ctx.timers().isr(id) {
            Some(isr) => isr(ctx),
            None => Ok(()),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// 中断帧
///
/// 回调返回或出错时出栈并清除运行标记。
struct IsrFrame<'a> {
    ctx: &'a SimContext,
    id: TimerId,
}

impl Drop for IsrFrame<'_> {
    fn drop(&mut self) {
        let popped = self.ctx.scheduler().stack.lock().pop();
        debug_assert_eq!(popped, Some(self.id));
        let _ = self
            .ctx
            .timers()
            .with_timer(self.id, |timer| timer.set_running(false));
    }
}
