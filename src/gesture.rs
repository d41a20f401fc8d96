// TiltRemote — Gesture Classifier
//
// Maps one period's fused pitch and raw accelerometer axes to a command, then
// debounces: a command is confirmed only after it has repeated for
// GESTURE_STABILITY_COUNT consecutive periods.

use crate::config::*;
use crate::events::GestureCommand;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureThresholds {
    /// |accel Y| in raw counts beyond which the remote is tilted sideways.
    pub side_counts: i16,
    pub forward_pitch: f32,
    pub down_pitch: f32,
    pub up_pitch_min: f32,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            side_counts: ACCEL_Y_SIDE_THRESHOLD,
            forward_pitch: PITCH_FORWARD_DEG,
            down_pitch: PITCH_DOWN_DEG,
            up_pitch_min: PITCH_UP_MIN_DEG,
        }
    }
}

/// Instantaneous classification, checked in priority order.
pub fn classify(accel: [i16; 3], pitch: f32, t: &GestureThresholds) -> GestureCommand {
    let [_, ay, az] = accel;
    let face_down = az < 0;

    if ay < -t.side_counts {
        GestureCommand::MoveRight
    } else if ay > t.side_counts {
        GestureCommand::MoveLeft
    } else if face_down && pitch > t.forward_pitch {
        GestureCommand::Forward
    } else if face_down && pitch < t.down_pitch {
        GestureCommand::Down
    } else if face_down && pitch > t.up_pitch_min && pitch < t.forward_pitch {
        GestureCommand::Up
    } else {
        GestureCommand::Suspend
    }
}

/// Debounce state.  Owned by the sensor task only.
#[derive(Debug, Clone, Copy)]
pub struct GestureState {
    current: GestureCommand,
    previous: Option<GestureCommand>,
    count: u8,
    stability: u8,
}

impl Default for GestureState {
    fn default() -> Self {
        Self::new(GESTURE_STABILITY_COUNT)
    }
}

impl GestureState {
    pub fn new(stability: u8) -> Self {
        Self {
            current: GestureCommand::default(),
            previous: None,
            count: 0,
            stability,
        }
    }

    /// Feed one period's classification.  Returns the command every period
    /// the stability count is reached; repeats are not suppressed.
    pub fn update(&mut self, instant: GestureCommand) -> Option<GestureCommand> {
        self.current = instant;
        if self.previous == Some(instant) {
            self.count = self.count.saturating_add(1).min(self.stability);
        } else {
            self.previous = Some(instant);
            self.count = 0;
        }

        (self.count == self.stability).then_some(instant)
    }

    pub fn current(&self) -> GestureCommand {
        self.current
    }

    pub fn count(&self) -> u8 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> GestureThresholds {
        GestureThresholds::default()
    }

    #[test]
    fn sideways_tilt_wins_over_pitch() {
        assert_eq!(classify([0, -6301, -100], 60.0, &t()), GestureCommand::MoveRight);
        assert_eq!(classify([0, 6301, -100], -60.0, &t()), GestureCommand::MoveLeft);
        assert_eq!(classify([0, -6300, 100], 0.0, &t()), GestureCommand::Suspend);
    }

    #[test]
    fn pitch_bands_require_face_down() {
        assert_eq!(classify([0, 0, -1], 50.0, &t()), GestureCommand::Forward);
        assert_eq!(classify([0, 0, -1], -31.0, &t()), GestureCommand::Down);
        assert_eq!(classify([0, 0, -1], 30.0, &t()), GestureCommand::Up);
        assert_eq!(classify([0, 0, 1], 50.0, &t()), GestureCommand::Suspend);
        assert_eq!(classify([0, 0, 0], -31.0, &t()), GestureCommand::Suspend);
    }

    #[test]
    fn band_edges_fall_through_to_neutral() {
        assert_eq!(classify([0, 0, -1], 47.0, &t()), GestureCommand::Suspend);
        assert_eq!(classify([0, 0, -1], 25.0, &t()), GestureCommand::Suspend);
        assert_eq!(classify([0, 0, -1], -30.0, &t()), GestureCommand::Suspend);
    }

    #[test]
    fn confirms_on_fifth_unchanged_period() {
        let mut state = GestureState::default();
        // First period only establishes the reference.
        assert_eq!(state.update(GestureCommand::Up), None);
        for _ in 0..4 {
            assert_eq!(state.update(GestureCommand::Up), None);
        }
        assert_eq!(state.update(GestureCommand::Up), Some(GestureCommand::Up));
        // Stays confirmed every period while stable.
        assert_eq!(state.update(GestureCommand::Up), Some(GestureCommand::Up));
        assert_eq!(state.count(), GESTURE_STABILITY_COUNT);
    }

    #[test]
    fn change_resets_counter_on_that_period() {
        let mut state = GestureState::default();
        for _ in 0..4 {
            state.update(GestureCommand::Forward);
        }
        assert_eq!(state.count(), 3);

        assert_eq!(state.update(GestureCommand::Down), None);
        assert_eq!(state.count(), 0);
        assert_eq!(state.current(), GestureCommand::Down);

        for _ in 0..4 {
            assert_eq!(state.update(GestureCommand::Down), None);
        }
        assert_eq!(state.update(GestureCommand::Down), Some(GestureCommand::Down));
    }
}
