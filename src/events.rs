// TiltRemote — Pipeline Data Types & Events

use core::fmt;

use crate::drivers::imu::ScaleFactors;

// ---------------------------------------------------------------------------
// Sensor Sample (one 6-axis burst from the MPU6050)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Raw accelerometer counts, X/Y/Z.
    pub accel: [i16; 3],
    /// Raw gyroscope counts, X/Y/Z.
    pub gyro: [i16; 3],
    pub scale: ScaleFactors,
}

impl SensorSample {
    pub fn physical(&self) -> SensorData {
        let a = |i: usize| self.accel[i] as f32 / self.scale.accel_counts_per_g;
        let g = |i: usize| self.gyro[i] as f32 / self.scale.gyro_counts_per_dps;
        SensorData {
            ax: a(0),
            ay: a(1),
            az: a(2),
            gx: g(0),
            gy: g(1),
            gz: g(2),
        }
    }
}

/// Sample in physical units: g and °/s.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorData {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
}

// ---------------------------------------------------------------------------
// Gesture Commands
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureCommand {
    MoveRight,
    MoveLeft,
    Forward,
    Down,
    Up,
    #[default]
    Suspend,
}

impl GestureCommand {
    /// Text written to the command output for a confirmed gesture.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MoveRight => "move right",
            Self::MoveLeft => "move left",
            Self::Forward => "forward",
            Self::Down => "DOWN",
            Self::Up => "UP",
            Self::Suspend => "suspend",
        }
    }
}

impl fmt::Display for GestureCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ---------------------------------------------------------------------------
// Remote Events — sent from the sensor task to the output task
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteEvent {
    /// Gesture held for the full stability count.
    Command(GestureCommand),
    /// Controller mode switched on (`true`) or off.
    ModeChanged(bool),
}
