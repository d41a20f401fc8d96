// TiltRemote — Mode Button Signal
//
// The button interrupt toggles a single mode bit; the sensor task reads it at
// the top of every period.  One writer (interrupt), one reader (task), so a
// pair of atomics is all the synchronisation needed.  Edges closer together
// than the debounce window are treated as contact bounce and dropped.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

const NO_EDGE: u32 = u32::MAX;

pub struct ModeSignal {
    active: AtomicBool,
    last_edge_ms: AtomicU32,
    debounce_ms: u32,
}

impl ModeSignal {
    /// Starts inactive: the remote waits for the first press.
    pub const fn new(debounce_ms: u32) -> Self {
        Self {
            active: AtomicBool::new(false),
            last_edge_ms: AtomicU32::new(NO_EDGE),
            debounce_ms,
        }
    }

    /// Interrupt entry point for a rising edge at `now_ms`.  Returns `true`
    /// if the edge toggled the mode.
    pub fn on_edge(&self, now_ms: u32) -> bool {
        let last = self.last_edge_ms.load(Ordering::Relaxed);
        if last != NO_EDGE && now_ms.wrapping_sub(last) < self.debounce_ms {
            return false;
        }
        self.last_edge_ms.store(now_ms, Ordering::Relaxed);
        self.toggle();
        true
    }

    /// Flip the mode bit; returns the new state.
    pub fn toggle(&self) -> bool {
        !self.active.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_inactive_and_toggles() {
        let mode = ModeSignal::new(200);
        assert!(!mode.is_active());
        assert!(mode.toggle());
        assert!(mode.is_active());
        assert!(!mode.toggle());
    }

    #[test]
    fn bounce_inside_window_is_ignored() {
        let mode = ModeSignal::new(200);
        assert!(mode.on_edge(1_000));
        assert!(!mode.on_edge(1_050));
        assert!(!mode.on_edge(1_199));
        assert!(mode.is_active());

        assert!(mode.on_edge(1_200));
        assert!(!mode.is_active());
    }

    #[test]
    fn first_edge_is_accepted_right_after_boot() {
        let mode = ModeSignal::new(200);
        assert!(mode.on_edge(5));
        assert!(mode.is_active());
    }

    #[test]
    fn window_survives_timer_wrap() {
        let mode = ModeSignal::new(200);
        assert!(mode.on_edge(u32::MAX - 100));
        assert!(!mode.on_edge(50));
        assert!(mode.on_edge(150));
    }
}
