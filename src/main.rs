// TiltRemote — Firmware Entry Point
//
// Boot sequence:
//   1. Bring up the mode LEDs and the GPIO two-wire bus.
//   2. Initialise the MPU6050, retrying until it answers with the right
//      identity ("Remote is NOT READY" on every failed attempt).
//   3. Arm the mode button interrupt.
//   4. Spawn the sensor and output tasks.
//
// The sensor task starts suspended; the first button press seeds the tilt
// estimate and starts sending gesture commands, the next press pauses it.
//
// Host builds run the same pipeline against a simulated sensor instead.

use std::sync::Arc;
use std::time::Duration;

use tiltremote::config::*;
use tiltremote::drivers::bus::{BusEngine, FaultMonitor};
use tiltremote::drivers::imu::Mpu6050;
use tiltremote::error::DeviceError;
use tiltremote::input::ModeSignal;

static MODE: ModeSignal = ModeSignal::new(MODE_DEBOUNCE_MS);

fn not_ready(attempt: u32, e: &DeviceError) {
    log::warn!("Remote is NOT READY! Please check the sensor (attempt {}: {})", attempt, e);
}

// ---------------------------------------------------------------------------
// Target: ESP-IDF
// ---------------------------------------------------------------------------
#[cfg(target_os = "espidf")]
pub fn now_ms() -> u32 {
    unsafe { (esp_idf_sys::esp_timer_get_time() / 1000) as u32 }
}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use std::sync::mpsc;
    use std::thread;

    use esp_idf_hal::delay::Ets;
    use esp_idf_hal::gpio::{InterruptType, PinDriver, Pull};
    use esp_idf_hal::prelude::*;

    use tiltremote::drivers::bitbang::BitBangTwi;
    use tiltremote::drivers::led::ModeIndicator;
    use tiltremote::fusion::KalmanAngle;
    use tiltremote::tasks;
    use tiltremote::tasks::sensor::RemotePipeline;

    // Link esp-idf-sys runtime patches and initialise logging.
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("TiltRemote firmware starting…");

    let peripherals = Peripherals::take()?;
    let cfg = RemoteConfig::default();

    // ---- Mode LEDs ---------------------------------------------------------
    let leds = ModeIndicator::new(
        PinDriver::output(peripherals.pins.gpio4)?,
        PinDriver::output(peripherals.pins.gpio5)?,
    );

    // ---- Two-wire bus (open-drain GPIO, external pull-ups) -----------------
    let faults = Arc::new(FaultMonitor::new());
    let twi = BitBangTwi::new(
        PinDriver::input_output_od(peripherals.pins.gpio6)?, // SDA
        PinDriver::input_output_od(peripherals.pins.gpio7)?, // SCL
        Ets,
        BUS_HALF_PERIOD_US,
        BUS_STRETCH_LIMIT,
        Arc::clone(&faults),
    );
    let mut imu = Mpu6050::new(BusEngine::new(twi, cfg.poll_limit), cfg.address);

    // ---- Sensor bring-up (blocks until the MPU6050 answers) ---------------
    imu.init_until_ready(&cfg, not_ready);
    log::info!("Remote is ready to use!");

    // ---- Mode button -------------------------------------------------------
    let mut button = PinDriver::input(peripherals.pins.gpio0)?;
    button.set_pull(Pull::Up)?;
    button.set_interrupt_type(InterruptType::NegEdge)?;
    // SAFETY: the callback only touches atomics and the ISR-safe timer.
    unsafe {
        button.subscribe(|| {
            MODE.on_edge(now_ms());
        })?;
    }
    button.enable_interrupt()?;

    // ---- Tasks (FreeRTOS tasks via std::thread) ----------------------------
    let (event_tx, event_rx) = mpsc::channel();

    let pipeline: RemotePipeline<_, KalmanAngle> = RemotePipeline::new(imu, &cfg, faults);
    let period = cfg.period;
    thread::Builder::new()
        .name("sensor".into())
        .stack_size(STACK_SENSOR)
        .spawn(move || {
            tasks::sensor::sensor_task(pipeline, &MODE, event_tx, period);
        })?;

    thread::Builder::new()
        .name("output".into())
        .stack_size(STACK_OUTPUT)
        .spawn(move || {
            tasks::output::output_task(event_rx, std::io::stdout(), leds);
        })?;

    // The GPIO driver disables the interrupt after each edge; re-arm it once
    // per debounce window.
    let rearm = Duration::from_millis(MODE_DEBOUNCE_MS as u64);
    loop {
        thread::sleep(rearm);
        button.enable_interrupt()?;
    }
}

// ---------------------------------------------------------------------------
// Host: simulated sensor, scripted tilt sequence
// ---------------------------------------------------------------------------
#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    use std::sync::mpsc;
    use std::thread;

    use tiltremote::drivers::led::ModeIndicator;
    use tiltremote::drivers::sim::{SimMotion, SimPeripheral, SimPin};
    use tiltremote::fusion::KalmanAngle;
    use tiltremote::tasks;
    use tiltremote::tasks::sensor::RemotePipeline;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("TiltRemote host simulation starting…");

    let cfg = RemoteConfig {
        period: Duration::from_millis(20),
        ..RemoteConfig::default()
    };

    // Raw counts at ±4 g, remote held face down.  Periods per pose.
    const SCRIPT: &[(&str, [i16; 3], u32)] = &[
        ("level", [0, 0, -8192], 8),
        ("tilt forward", [-7094, 0, -4096], 20),
        ("tilt up", [-4699, 0, -6711], 20),
        ("tilt down", [5793, 0, -5793], 20),
        ("roll right", [0, -7000, -4000], 10),
        ("roll left", [0, 7000, -4000], 10),
    ];

    let motion = Arc::new(SimMotion::default());
    let faults = Arc::new(FaultMonitor::new());
    let mut sim = SimPeripheral::new(cfg.address)
        .with_fault_monitor(Arc::clone(&faults))
        .with_motion(Arc::clone(&motion));
    sim.absent_for(2);

    let mut imu = Mpu6050::new(BusEngine::new(sim, cfg.poll_limit), cfg.address);
    imu.init_until_ready(&cfg, not_ready);
    log::info!("Remote is ready to use!");

    let (event_tx, event_rx) = mpsc::channel();

    let pipeline: RemotePipeline<_, KalmanAngle> = RemotePipeline::new(imu, &cfg, faults);
    let period = cfg.period;
    thread::Builder::new()
        .name("sensor".into())
        .spawn(move || {
            tasks::sensor::sensor_task(pipeline, &MODE, event_tx, period);
        })?;

    let leds = ModeIndicator::new(SimPin::default(), SimPin::default());
    thread::Builder::new()
        .name("output".into())
        .spawn(move || {
            tasks::output::output_task(event_rx, std::io::stdout(), leds);
        })?;

    // Simulated button press.
    MODE.toggle();

    for (pose, accel, periods) in SCRIPT {
        log::info!("Pose: {}", pose);
        motion.set_accel(*accel);
        thread::sleep(period * *periods);
    }

    MODE.toggle();
    thread::sleep(period * 2);
    println!();
    log::info!("Simulation finished");
    Ok(())
}
