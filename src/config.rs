// TiltRemote — Hardware & System Configuration
// Target: ESP32 (ESP-IDF) with an MPU6050 on a GPIO two-wire bus

use std::time::Duration;

use crate::drivers::bus::FaultPolicy;
use crate::drivers::imu::{AccelRange, GyroRange};

// ---------------------------------------------------------------------------
// GPIO Pin Definitions
// ---------------------------------------------------------------------------
pub const PIN_MODE_BUTTON: i32 = 0; // BOOT button — mode toggle (press edge)
pub const PIN_LED_ACTIVE: i32 = 4;  // Green — controller mode
pub const PIN_LED_IDLE: i32 = 5;    // Red   — idle / suspended
pub const PIN_BUS_SDA: i32 = 6;     // Two-wire data line (open drain)
pub const PIN_BUS_SCL: i32 = 7;     // Two-wire clock line (open drain)

// ---------------------------------------------------------------------------
// Two-wire Bus
// ---------------------------------------------------------------------------
pub const BUS_ADDR_MPU6050: u8 = 0x68;      // 7-bit, AD0 low
pub const BUS_POLL_LIMIT: u32 = 20_000;     // status polls per bounded wait
pub const BUS_HALF_PERIOD_US: u32 = 5;      // ~100 kHz SCL
pub const BUS_STRETCH_LIMIT: u32 = 1_000;   // SCL reads before a stretch is abandoned

// ---------------------------------------------------------------------------
// MPU6050 Register Map
// ---------------------------------------------------------------------------
pub const REG_SMPLRT_DIV: u8 = 0x19;
pub const REG_GYRO_CONFIG: u8 = 0x1B;
pub const REG_ACCEL_CONFIG: u8 = 0x1C;
pub const REG_ACCEL_XOUT_H: u8 = 0x3B; // Start of 14-byte sensor burst
pub const REG_GYRO_XOUT_H: u8 = 0x43;
pub const REG_PWR_MGMT_1: u8 = 0x6B;
pub const REG_WHO_AM_I: u8 = 0x75;
pub const WHO_AM_I_EXPECTED: u8 = 0x68;

pub const PWR_MGMT_WAKE_PLL_X: u8 = 0x01; // SLEEP cleared, clock = PLL w/ X gyro
pub const SMPLRT_DIV_1KHZ: u8 = 0x07;     // 8 kHz / (1 + 7)
pub const RANGE_FIELD_MASK: u8 = 0x18;    // bits 4:3 of *_CONFIG
pub const RANGE_FIELD_SHIFT: u8 = 3;

pub const BURST_AXIS_LEN: usize = 6;
pub const BURST_COMBINED_LEN: usize = 14; // accel(6) + temperature(2) + gyro(6)

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------
pub const STACK_SENSOR: usize = 4096;
pub const STACK_OUTPUT: usize = 3072;
pub const SENSOR_PERIOD_MS: u64 = 100;
pub const INTEGRATION_INTERVAL_S: f32 = 0.3;
pub const MODE_DEBOUNCE_MS: u32 = 200;

// ---------------------------------------------------------------------------
// Gesture Thresholds (raw accelerometer counts / fused degrees)
// ---------------------------------------------------------------------------
pub const ACCEL_Y_SIDE_THRESHOLD: i16 = 6300;
pub const PITCH_FORWARD_DEG: f32 = 47.0;
pub const PITCH_DOWN_DEG: f32 = -30.0;
pub const PITCH_UP_MIN_DEG: f32 = 25.0;
pub const GESTURE_STABILITY_COUNT: u8 = 5;

// ---------------------------------------------------------------------------
// Orientation Estimator (Kalman) Tuning
// ---------------------------------------------------------------------------
pub const KALMAN_Q_ANGLE: f32 = 0.001;
pub const KALMAN_Q_BIAS: f32 = 0.003;
pub const KALMAN_R_MEASURE: f32 = 0.03;

/// Runtime settings for one sensing session.
#[derive(Debug, Clone, Copy)]
pub struct RemoteConfig {
    pub address: u8,
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
    pub sample_rate_divider: u8,
    pub period: Duration,
    /// Integration interval handed to the estimator, independent of `period`.
    pub integration_interval_s: f32,
    pub poll_limit: u32,
    pub fault_policy: FaultPolicy,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            address: BUS_ADDR_MPU6050,
            accel_range: AccelRange::G4,
            gyro_range: GyroRange::Dps250,
            sample_rate_divider: SMPLRT_DIV_1KHZ,
            period: Duration::from_millis(SENSOR_PERIOD_MS),
            integration_interval_s: INTEGRATION_INTERVAL_S,
            poll_limit: BUS_POLL_LIMIT,
            fault_policy: FaultPolicy::ReportOnly,
        }
    }
}
