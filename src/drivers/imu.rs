// TiltRemote — MPU6050 IMU Driver
//
// Register-level driver on top of the two-wire bus engine: presence probe,
// identity check, range configuration by read-modify-write, and burst reads of
// the accelerometer / gyroscope blocks.

use crate::config::*;
use crate::drivers::bus::{BusEngine, TwiPeripheral};
use crate::error::{BusResult, DeviceError};
use crate::events::SensorSample;

/// Accelerometer full-scale range (AFS_SEL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelRange {
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

impl AccelRange {
    /// LSB per g.
    pub fn counts_per_unit(self) -> f32 {
        match self {
            Self::G2 => 16384.0,
            Self::G4 => 8192.0,
            Self::G8 => 4096.0,
            Self::G16 => 2048.0,
        }
    }
}

/// Gyroscope full-scale range (FS_SEL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroRange {
    Dps250 = 0,
    Dps500 = 1,
    Dps1000 = 2,
    Dps2000 = 3,
}

impl GyroRange {
    /// LSB per °/s.
    pub fn counts_per_unit(self) -> f32 {
        match self {
            Self::Dps250 => 131.0,
            Self::Dps500 => 65.5,
            Self::Dps1000 => 32.8,
            Self::Dps2000 => 16.4,
        }
    }
}

/// Counts-per-unit divisors fixed when the ranges are configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub accel_counts_per_g: f32,
    pub gyro_counts_per_dps: f32,
}

impl ScaleFactors {
    pub fn for_ranges(accel: AccelRange, gyro: GyroRange) -> Self {
        Self {
            accel_counts_per_g: accel.counts_per_unit(),
            gyro_counts_per_dps: gyro.counts_per_unit(),
        }
    }
}

/// Replace the 2-bit range field at bits 4:3, keeping every other bit.
pub fn with_range_field(current: u8, range: u8) -> u8 {
    (current & !RANGE_FIELD_MASK) | ((range << RANGE_FIELD_SHIFT) & RANGE_FIELD_MASK)
}

/// Three big-endian signed 16-bit values (high byte first).
pub fn decode_axes(bytes: &[u8; BURST_AXIS_LEN]) -> [i16; 3] {
    [
        i16::from_be_bytes([bytes[0], bytes[1]]),
        i16::from_be_bytes([bytes[2], bytes[3]]),
        i16::from_be_bytes([bytes[4], bytes[5]]),
    ]
}

pub struct Mpu6050<P> {
    bus: BusEngine<P>,
    address: u8,
    scale: ScaleFactors,
}

impl<P: TwiPeripheral> Mpu6050<P> {
    pub fn new(bus: BusEngine<P>, address: u8) -> Self {
        Self {
            bus,
            address,
            scale: ScaleFactors::for_ranges(AccelRange::G4, GyroRange::Dps250),
        }
    }

    pub fn bus(&self) -> &BusEngine<P> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut BusEngine<P> {
        &mut self.bus
    }

    pub fn scale(&self) -> ScaleFactors {
        self.scale
    }

    /// Verify the device acknowledges its address.  The bus is idle afterwards.
    pub fn is_connected(&mut self) -> bool {
        self.bus.probe(self.address)
    }

    pub fn verify_identity(&mut self, expected: u8) -> Result<(), DeviceError> {
        let found = self.bus.read_register(self.address, REG_WHO_AM_I)?;
        if found != expected {
            return Err(DeviceError::Invalid { found });
        }
        Ok(())
    }

    pub fn read_register(&mut self, reg: u8) -> BusResult<u8> {
        self.bus.read_register(self.address, reg)
    }

    pub fn write_register(&mut self, reg: u8, value: u8) -> BusResult<()> {
        self.bus.write_register(self.address, reg, value)
    }

    fn update_range(&mut self, reg: u8, range: u8) -> BusResult<()> {
        let current = self.read_register(reg)?;
        self.write_register(reg, with_range_field(current, range))
    }

    /// Set both full-scale ranges and fix the scale factors for the session.
    pub fn configure(&mut self, accel: AccelRange, gyro: GyroRange) -> Result<(), DeviceError> {
        self.update_range(REG_ACCEL_CONFIG, accel as u8)?;
        self.update_range(REG_GYRO_CONFIG, gyro as u8)?;
        self.scale = ScaleFactors::for_ranges(accel, gyro);
        Ok(())
    }

    /// Probe, check identity, wake, set sample rate and ranges.
    ///
    /// `NotConnected` and `Invalid` stop the sequence before any register is
    /// written.
    pub fn init(&mut self, cfg: &RemoteConfig) -> Result<ScaleFactors, DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        self.verify_identity(WHO_AM_I_EXPECTED)?;

        self.write_register(REG_PWR_MGMT_1, PWR_MGMT_WAKE_PLL_X)?;
        self.write_register(REG_SMPLRT_DIV, cfg.sample_rate_divider)?;
        self.configure(cfg.accel_range, cfg.gyro_range)?;

        log::info!(
            "MPU6050 initialised ({:?}, {:?}, divider {})",
            cfg.accel_range,
            cfg.gyro_range,
            cfg.sample_rate_divider
        );
        Ok(self.scale)
    }

    /// Retry [`init`](Self::init) until it succeeds.  No backoff and no
    /// attempt limit: the remote is useless without the sensor.
    pub fn init_until_ready(
        &mut self,
        cfg: &RemoteConfig,
        mut on_failure: impl FnMut(u32, &DeviceError),
    ) -> ScaleFactors {
        let mut attempt = 0u32;
        loop {
            attempt = attempt.wrapping_add(1);
            match self.init(cfg) {
                Ok(scale) => return scale,
                Err(e) => on_failure(attempt, &e),
            }
        }
    }

    pub fn read_burst(&mut self, start: u8, buf: &mut [u8]) -> BusResult<()> {
        self.bus.read_multiple(self.address, start, buf)
    }

    pub fn read_accelerometer(&mut self) -> BusResult<[i16; 3]> {
        let mut raw = [0u8; BURST_AXIS_LEN];
        self.read_burst(REG_ACCEL_XOUT_H, &mut raw)?;
        Ok(decode_axes(&raw))
    }

    pub fn read_gyroscope(&mut self) -> BusResult<[i16; 3]> {
        let mut raw = [0u8; BURST_AXIS_LEN];
        self.read_burst(REG_GYRO_XOUT_H, &mut raw)?;
        Ok(decode_axes(&raw))
    }

    /// One 14-byte burst: accel, temperature (skipped), gyro.
    pub fn read_combined(&mut self) -> BusResult<SensorSample> {
        let mut raw = [0u8; BURST_COMBINED_LEN];
        self.read_burst(REG_ACCEL_XOUT_H, &mut raw)?;

        // raw[6..8] = temperature — skipped
        let accel: [u8; BURST_AXIS_LEN] = core::array::from_fn(|i| raw[i]);
        let gyro: [u8; BURST_AXIS_LEN] = core::array::from_fn(|i| raw[8 + i]);

        Ok(SensorSample {
            accel: decode_axes(&accel),
            gyro: decode_axes(&gyro),
            scale: self.scale,
        })
    }
}
