// TiltRemote — Tilt Estimation
//
// Gravity-vector angles from the accelerometer, and a per-axis estimator that
// fuses them with the gyroscope rate.  The pipeline only depends on
// AngleEstimator; KalmanAngle is the estimator shipped with the firmware.

use crate::config::{KALMAN_Q_ANGLE, KALMAN_Q_BIAS, KALMAN_R_MEASURE};

/// Roll and pitch in degrees from a gravity vector.
///
/// `roll = atan2(-y, -z)`, `pitch = atan(-x / sqrt(y² + z²))`.  Inputs only
/// need a common unit, so raw counts work as well as g.
pub fn gravity_angles(x: f32, y: f32, z: f32) -> (f32, f32) {
    let roll = (-y).atan2(-z).to_degrees();
    // atan2 with a non-negative denominator equals the atan form and stays
    // finite when the sensor points straight up or down.
    let pitch = (-x).atan2((y * y + z * z).sqrt()).to_degrees();
    (roll, pitch)
}

/// Per-axis angle estimator.
pub trait AngleEstimator {
    /// Reset to a zero state.
    fn initialize(&mut self);
    /// Force the angle estimate, keeping the rest of the state.
    fn seed(&mut self, angle: f32);
    /// Combine a measured angle (°) and rate (°/s) over `dt` seconds.
    fn fuse(&mut self, measured_angle: f32, measured_rate: f32, dt: f32) -> f32;
    fn angle(&self) -> f32;
}

/// Two-state (angle, gyro bias) Kalman filter.
#[derive(Debug, Clone, Copy)]
pub struct KalmanAngle {
    q_angle: f32,
    q_bias: f32,
    r_measure: f32,

    angle: f32,
    bias: f32,
    p: [[f32; 2]; 2],
}

impl Default for KalmanAngle {
    fn default() -> Self {
        Self::new(KALMAN_Q_ANGLE, KALMAN_Q_BIAS, KALMAN_R_MEASURE)
    }
}

impl KalmanAngle {
    pub fn new(q_angle: f32, q_bias: f32, r_measure: f32) -> Self {
        Self {
            q_angle,
            q_bias,
            r_measure,
            angle: 0.0,
            bias: 0.0,
            p: [[0.0; 2]; 2],
        }
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }
}

impl AngleEstimator for KalmanAngle {
    fn initialize(&mut self) {
        self.angle = 0.0;
        self.bias = 0.0;
        self.p = [[0.0; 2]; 2];
    }

    fn seed(&mut self, angle: f32) {
        self.angle = angle;
    }

    fn fuse(&mut self, measured_angle: f32, measured_rate: f32, dt: f32) -> f32 {
        // Predict
        let rate = measured_rate - self.bias;
        self.angle += dt * rate;

        let p = &mut self.p;
        p[0][0] += dt * (dt * p[1][1] - p[0][1] - p[1][0] + self.q_angle);
        p[0][1] -= dt * p[1][1];
        p[1][0] -= dt * p[1][1];
        p[1][1] += self.q_bias * dt;

        // Update
        let s = p[0][0] + self.r_measure;
        let k = [p[0][0] / s, p[1][0] / s];
        let y = measured_angle - self.angle;
        self.angle += k[0] * y;
        self.bias += k[1] * y;

        let (p00, p01) = (p[0][0], p[0][1]);
        p[0][0] -= k[0] * p00;
        p[0][1] -= k[0] * p01;
        p[1][0] -= k[1] * p00;
        p[1][1] -= k[1] * p01;

        self.angle
    }

    fn angle(&self) -> f32 {
        self.angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn level_face_down_sensor_has_zero_tilt() {
        // Mounted upside down: gravity reads as -Z.
        let (roll, pitch) = gravity_angles(0.0, 0.0, -1.0);
        assert_relative_eq!(roll, 0.0);
        assert_relative_eq!(pitch, 0.0);
    }

    #[test]
    fn pitch_follows_x_axis_tilt() {
        let (_, pitch) = gravity_angles(-1.0, 0.0, -1.0);
        assert_relative_eq!(pitch, 45.0, epsilon = 1e-4);

        let (_, pitch) = gravity_angles(-1.0, 0.0, 0.0);
        assert_relative_eq!(pitch, 90.0, epsilon = 1e-4);
    }

    #[test]
    fn roll_spans_full_circle() {
        let (roll, _) = gravity_angles(0.0, -1.0, 0.0);
        assert_relative_eq!(roll, 90.0, epsilon = 1e-4);
        let (roll, _) = gravity_angles(0.0, 0.0, 1.0);
        assert_relative_eq!(roll.abs(), 180.0, epsilon = 1e-4);
    }

    #[test]
    fn degenerate_vector_is_finite() {
        let (roll, pitch) = gravity_angles(0.0, 0.0, 0.0);
        assert!(roll.is_finite());
        assert!(pitch.is_finite());
    }

    #[test]
    fn seeded_filter_holds_steady_measurement() {
        let mut k = KalmanAngle::default();
        k.initialize();
        k.seed(30.0);
        for _ in 0..50 {
            k.fuse(30.0, 0.0, 0.3);
        }
        assert_relative_eq!(k.angle(), 30.0, epsilon = 1e-3);
    }

    #[test]
    fn filter_converges_towards_measurement() {
        let mut k = KalmanAngle::default();
        k.initialize();
        let first = k.fuse(20.0, 0.0, 0.3);
        assert!(first > 0.0 && first < 20.0);
        let mut angle = first;
        for _ in 0..300 {
            angle = k.fuse(20.0, 0.0, 0.3);
        }
        assert_relative_eq!(angle, 20.0, epsilon = 0.5);
    }

    #[test]
    fn initialize_clears_state() {
        let mut k = KalmanAngle::default();
        k.seed(12.0);
        k.fuse(14.0, 5.0, 0.3);
        k.initialize();
        assert_eq!(k.angle(), 0.0);
        assert_eq!(k.bias(), 0.0);
    }
}
