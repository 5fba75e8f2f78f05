use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use neon_sim::config::TICK_FREQUENCY;
use neon_sim::error::SimError;
use neon_sim::kernel::timer::{TimerId, TimerSpec};
use neon_sim::kernel::{SimBuilder, SimContext};
use spin::Mutex;

const A: TimerId = TimerId::new(0);
const B: TimerId = TimerId::new(1);

fn sim(specs: Vec<TimerSpec>) -> SimContext {
    SimBuilder::new()
        .timers(specs)
        .realtime_scale(100.0)
        .build()
        .unwrap()
}

/// 以全局 tick 为时钟域，周期为 `period` 个 tick
fn periodic(ctx: &SimContext, id: TimerId, period: u64) {
    ctx.timers().init(id, TICK_FREQUENCY).unwrap();
    ctx.timers().start(id, ctx.time().ticks(), TICK_FREQUENCY).unwrap();
    ctx.timers().set_compare(id, period).unwrap();
    ctx.timers().enable(id).unwrap();
}

fn counter(ctx: &SimContext, id: TimerId) -> Arc<AtomicU32> {
    let count = Arc::new(AtomicU32::new(0));
    let hits = count.clone();
    ctx.timers()
        .set_isr(id, move |_ctx| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    count
}

#[test]
fn test_higher_rate_timer_dispatched_more_often() {
    let ctx = sim(vec![TimerSpec::new("A", 1), TimerSpec::new("B", 2)]);
    let a = counter(&ctx, A);
    let b = counter(&ctx, B);
    periodic(&ctx, A, 100);
    periodic(&ctx, B, 30);

    ctx.start();
    ctx.delay_cycles(300).unwrap();

    // 300 时刻两者同时到期，A 先派发后窗口结束
    assert_eq!(a.load(Ordering::SeqCst), 3);
    assert_eq!(b.load(Ordering::SeqCst), 9);
    assert!(b.load(Ordering::SeqCst) >= 3 * a.load(Ordering::SeqCst));
    assert_eq!(ctx.time().ticks(), 300);
}

#[test]
fn test_lower_priority_never_preempts() {
    let ctx = sim(vec![TimerSpec::new("A", 1), TimerSpec::new("B", 2)]);
    let violated = Arc::new(AtomicBool::new(false));
    let b_hits = Arc::new(AtomicU32::new(0));

    // A 在中断内忙等，期间调度器仍在运行
    ctx.timers()
        .set_isr(A, |ctx| ctx.delay_cycles(50))
        .unwrap();
    let flag = violated.clone();
    let hits = b_hits.clone();
    ctx.timers()
        .set_isr(B, move |ctx| {
            if ctx.scheduler().stack_snapshot().contains(&A) {
                flag.store(true, Ordering::SeqCst);
            }
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    periodic(&ctx, A, 100);
    periodic(&ctx, B, 30);

    ctx.start();
    ctx.delay_cycles(300).unwrap();

    assert!(!violated.load(Ordering::SeqCst));
    assert!(b_hits.load(Ordering::SeqCst) > 0);
    assert_eq!(ctx.scheduler().depth(), 0);
}

#[test]
fn test_higher_priority_nests_inside_lower() {
    let ctx = sim(vec![TimerSpec::new("high", 1), TimerSpec::new("low", 5)]);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let stacks = seen.clone();
    ctx.timers()
        .set_isr(TimerId::new(0), move |ctx| {
            stacks.lock().push(ctx.scheduler().stack_snapshot());
            Ok(())
        })
        .unwrap();
    ctx.timers()
        .set_isr(TimerId::new(1), |ctx| ctx.delay_cycles(100))
        .unwrap();
    periodic(&ctx, TimerId::new(0), 40);
    periodic(&ctx, TimerId::new(1), 30);

    ctx.start();
    ctx.delay_cycles(100).unwrap();

    let seen = seen.lock();
    assert!(!seen.is_empty());
    assert!(seen.iter().any(|stack| stack == &vec![TimerId::new(1), TimerId::new(0)]));
    assert_eq!(ctx.scheduler().stats().max_depth, 2);
}

#[test]
fn test_late_dispatch_resets_window() {
    let ctx = sim(vec![TimerSpec::new("slow", 3)]);
    let hits = counter(&ctx, A);
    periodic(&ctx, A, 100);

    ctx.start();
    // 跳过三个周期，只补发一次
    ctx.time().add_ticks(350);
    assert!(ctx.execute_loop(u64::MAX).unwrap());
    assert!(!ctx.execute_loop(ctx.time().ticks()).unwrap());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let stats = ctx.scheduler().stats();
    assert_eq!(stats.late, 1);
    assert_eq!(stats.last_timing_error_nanos, 2_500);
    assert_eq!(ctx.timers().snapshot(A).unwrap().source_offset(), 350);
    assert_eq!(ctx.timers().next_interrupt(A, TICK_FREQUENCY).unwrap(), Some(450));
}

#[test]
fn test_masked_timer_never_dispatched() {
    let ctx = SimBuilder::new()
        .timers(vec![TimerSpec::new("A", 1), TimerSpec::new("B", 2)])
        .masked_timer("B")
        .realtime_scale(100.0)
        .build()
        .unwrap();
    let a = counter(&ctx, A);
    let b = counter(&ctx, B);
    periodic(&ctx, A, 50);
    periodic(&ctx, B, 50);

    ctx.start();
    ctx.delay_cycles(200).unwrap();
    assert_eq!(a.load(Ordering::SeqCst), 4);
    assert_eq!(b.load(Ordering::SeqCst), 0);
}

#[test]
fn test_quit_unwinds_nested_frames() {
    let ctx = Arc::new(sim(vec![TimerSpec::new("tick", 1), TimerSpec::new("loop", 9)]));
    let ticks = Arc::new(AtomicU32::new(0));

    let count = ticks.clone();
    ctx.timers()
        .set_isr(A, move |ctx| {
            if count.fetch_add(1, Ordering::SeqCst) == 2 {
                ctx.request_quit();
            }
            Ok(())
        })
        .unwrap();
    // 主循环永远不返回，只能靠退出请求结束
    ctx.timers()
        .set_isr(B, |ctx| loop {
            ctx.yield_now()?;
        })
        .unwrap();
    periodic(&ctx, A, 1_000);
    periodic(&ctx, B, 10);

    assert_eq!(ctx.run(), Ok(()));
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
    assert_eq!(ctx.scheduler().depth(), 0);
    assert!(!ctx.timers().snapshot(B).unwrap().is_running());
    assert_eq!(ctx.delay_cycles(10), Err(SimError::QuitRequested));
}

#[test]
fn test_isr_error_propagates_out_of_run() {
    let ctx = sim(vec![TimerSpec::new("faulty", 1)]);
    ctx.timers()
        .set_isr(A, |_ctx| Err(SimError::BusNotFound(7)))
        .unwrap();
    periodic(&ctx, A, 10);
    assert_eq!(ctx.run(), Err(SimError::BusNotFound(7)));
    assert_eq!(ctx.scheduler().depth(), 0);
}
