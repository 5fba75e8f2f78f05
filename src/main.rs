//! neon-sim 命令行入口
//!
//! 运行一个内置的演示固件：LED 闪烁、SysTick 计时、步进脉冲直到触发限位开关、
//! SPI Flash 读写自检，以及串口 0 回显（可选通过 TCP 暴露）。

use core::sync::atomic::{AtomicU64, Ordering};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use neon_sim::config::{DEFAULT_NET_PORT, SimConfig};
use neon_sim::drivers::devices::{EndStop, W25QxxFlash};
use neon_sim::drivers::{ArduinoMode, HIGH, LOW, PinId, SlavePeripheral};
use neon_sim::error::{Result, SimError};
use neon_sim::hal::Hal;
use neon_sim::ipc::{MonitorPump, NetSerialPump};
use neon_sim::kernel::timer::{FIRMWARE_LOOP_TIMER, STEPPER_TIMER, SYSTICK_TIMER};
use neon_sim::kernel::{Firmware, SimBuilder, SimContext, spawn_firmware_thread};
use neon_sim::log::{self, LogLevel};
use neon_sim::net::NetSerialBridge;

const LED_PIN: PinId = 13;
const STEP_PIN: PinId = 20;
const ENDSTOP_PIN: PinId = 3;
const FLASH_CS_PIN: PinId = 10;
const FLASH_BUS: usize = 0;
const FLASH_SIZE: usize = 1024 * 1024;
/// 触发限位前的步数
const TRAVEL_STEPS: u64 = 1_000;

#[derive(Parser, Debug)]
#[command(name = "neon-sim", about = "Run firmware on a simulated microcontroller.")]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Realtime scale, 0 pauses and 99 or more runs unbounded
    #[arg(long, value_name = "FACTOR")]
    scale: Option<f32>,

    /// Expose serial port 0 over TCP (`--port` alone listens on 8099)
    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = DEFAULT_NET_PORT.to_string())]
    port: Option<u16>,

    /// Stop after this many wall-clock milliseconds (runs until killed otherwise)
    #[arg(long, value_name = "MS")]
    duration_ms: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
}

// ============================================================================
// 演示固件
// ============================================================================

struct DemoFirmware {
    uptime_ms: Arc<AtomicU64>,
    steps: Arc<AtomicU64>,
    last_blink: u64,
}

impl DemoFirmware {
    fn flash_command(hal: &Hal, command: &[u8], payload: &[u8], read_back: &mut [u8]) -> Result<()> {
        let ctx = hal.context();
        hal.digital_write(FLASH_CS_PIN, LOW);
        let bus = ctx.spi_bus(FLASH_BUS)?;
        bus.transfer_bytes(ctx, Some(command), None);
        if !payload.is_empty() {
            bus.transfer_bytes(ctx, Some(payload), None);
        }
        if !read_back.is_empty() {
            hal.spi_read(FLASH_BUS, read_back)?;
        }
        hal.digital_write(FLASH_CS_PIN, HIGH);
        Ok(())
    }

    fn flash_self_test(hal: &Hal) -> Result<()> {
        const PATTERN: &[u8] = b"neon";
        Self::flash_command(hal, &[0x06], &[], &mut [])?;
        Self::flash_command(hal, &[0x02, 0x00, 0x01, 0x00], PATTERN, &mut [])?;
        let mut readback = [0u8; 4];
        Self::flash_command(hal, &[0x03, 0x00, 0x01, 0x00], &[], &mut readback)?;
        if readback == PATTERN {
            tracing::info!("flash self test passed");
        } else {
            tracing::warn!(?readback, "flash self test failed");
        }
        Ok(())
    }
}

impl Firmware for DemoFirmware {
    fn setup(&mut self, hal: &Hal) -> Result<()> {
        let ctx = hal.context();
        hal.pin_mode(LED_PIN, ArduinoMode::Output);
        hal.pin_mode(STEP_PIN, ArduinoMode::Output);
        hal.pin_mode(ENDSTOP_PIN, ArduinoMode::InputPullup);
        hal.pin_mode(FLASH_CS_PIN, ArduinoMode::Output);
        hal.digital_write(FLASH_CS_PIN, HIGH);

        let uptime = self.uptime_ms.clone();
        ctx.timers().set_isr(SYSTICK_TIMER, move |_ctx| {
            uptime.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })?;
        hal.timer_init(SYSTICK_TIMER, 1_000_000)?;
        hal.timer_start(SYSTICK_TIMER, 1_000)?;
        hal.timer_enable_interrupt(SYSTICK_TIMER)?;

        let steps = self.steps.clone();
        ctx.timers().set_isr(STEPPER_TIMER, move |ctx| {
            let hal = Hal::new(ctx);
            if hal.digital_read(ENDSTOP_PIN) == HIGH {
                return hal.timer_disable_interrupt(STEPPER_TIMER);
            }
            hal.digital_write(STEP_PIN, ctx.gpio().value(STEP_PIN) ^ 1);
            steps.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })?;
        hal.timer_init(STEPPER_TIMER, 2_000_000)?;
        hal.timer_start(STEPPER_TIMER, 2_000)?;
        hal.timer_enable_interrupt(STEPPER_TIMER)?;

        Self::flash_self_test(hal)?;
        let serial = hal.serial(0)?;
        serial.write_bytes(ctx, b"start\n")?;
        Ok(())
    }

    fn run_loop(&mut self, hal: &Hal) -> Result<()> {
        let ctx = hal.context();
        let serial = hal.serial(0)?;
        while let Some(byte) = serial.read() {
            serial.write(ctx, byte)?;
        }

        let now = hal.millis()?;
        if now.saturating_sub(self.last_blink) >= 250 {
            self.last_blink = now;
            hal.digital_write(LED_PIN, ctx.gpio().value(LED_PIN) ^ 1);
        }
        Ok(())
    }
}

// ============================================================================
// 入口
// ============================================================================

fn load_config(args: &Args) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(scale) = args.scale {
        config.realtime_scale = scale;
    }
    if let Some(port) = args.port {
        config.net_port = Some(port);
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    log::init(config.log_level);

    // 先监听端口，绑定失败时不启动仿真
    let bridge = config
        .net_port
        .map(|port| NetSerialBridge::listen(("0.0.0.0", port)))
        .transpose()?;

    let ctx: Arc<SimContext> = Arc::new(SimBuilder::from_config(config).build()?);
    let serial = ctx.serial(0)?.clone();
    let monitor = match &bridge {
        Some(bridge) => {
            ctx.add_transport(Arc::new(NetSerialPump::new(serial, bridge.rx(), bridge.tx())));
            None
        }
        None => {
            let monitor = Arc::new(MonitorPump::new(serial));
            ctx.add_transport(monitor.clone());
            Some(monitor)
        }
    };

    let steps = Arc::new(AtomicU64::new(0));
    let travelled = steps.clone();
    let endstop = EndStop::attach(&ctx, ENDSTOP_PIN, false, move || {
        travelled.load(Ordering::Relaxed) >= TRAVEL_STEPS
    });
    let _flash = SlavePeripheral::attach(&ctx, FLASH_BUS, FLASH_CS_PIN, W25QxxFlash::new(FLASH_SIZE))?;

    let uptime_ms = Arc::new(AtomicU64::new(0));
    ctx.install_firmware(
        FIRMWARE_LOOP_TIMER,
        DemoFirmware {
            uptime_ms: uptime_ms.clone(),
            steps: steps.clone(),
            last_blink: 0,
        },
    )?;

    let handle = spawn_firmware_thread(ctx.clone())?;
    if let Some(ms) = args.duration_ms {
        std::thread::sleep(Duration::from_millis(ms));
        ctx.request_quit();
    }
    let outcome = handle
        .join()
        .map_err(|_| SimError::Config("simulation thread panicked".into()))?;

    if let Some(bridge) = &bridge {
        bridge.stop();
    }
    if let Some(monitor) = monitor {
        tracing::info!(output = %monitor.take(), "serial 0");
    }
    let stats = ctx.scheduler().stats();
    tracing::info!(
        virtual_ms = ctx.time().now_millis(),
        systick_ms = uptime_ms.load(Ordering::Relaxed),
        steps = steps.load(Ordering::Relaxed),
        endstop_reads = endstop.reads(),
        dispatched = stats.dispatched,
        late = stats.late,
        max_depth = stats.max_depth,
        "simulation finished"
    );
    outcome
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("neon-sim: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_flag_defaults() {
        let args = Args::try_parse_from(["neon-sim", "--port"]).unwrap();
        assert_eq!(args.port, Some(DEFAULT_NET_PORT));
        let args = Args::try_parse_from(["neon-sim", "--port", "9001"]).unwrap();
        assert_eq!(args.port, Some(9001));
        let args = Args::try_parse_from(["neon-sim"]).unwrap();
        assert_eq!(args.port, None);
        assert_eq!(load_config(&args).unwrap().net_port, None);
    }
}
