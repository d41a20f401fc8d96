// TiltRemote — Mode Indicator LEDs
//
// Green while in controller mode, red while idle.

use embedded_hal::digital::OutputPin;

pub struct ModeIndicator<A, I> {
    active: A,
    idle: I,
}

impl<A: OutputPin, I: OutputPin> ModeIndicator<A, I> {
    /// Shows idle until the first mode change.
    pub fn new(active: A, idle: I) -> Self {
        let mut indicator = Self { active, idle };
        indicator.show(false);
        indicator
    }

    pub fn show(&mut self, controller_mode: bool) {
        if controller_mode {
            let _ = self.active.set_high();
            let _ = self.idle.set_low();
        } else {
            let _ = self.idle.set_high();
            let _ = self.active.set_low();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::convert::Infallible;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Led(Rc<Cell<bool>>);

    impl embedded_hal::digital::ErrorType for Led {
        type Error = Infallible;
    }

    impl OutputPin for Led {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.set(true);
            Ok(())
        }
    }

    #[test]
    fn lights_exactly_one_led() {
        let (green, red) = (Led::default(), Led::default());
        let mut leds = ModeIndicator::new(green.clone(), red.clone());
        assert!(!green.0.get() && red.0.get());

        leds.show(true);
        assert!(green.0.get() && !red.0.get());

        leds.show(false);
        assert!(!green.0.get() && red.0.get());
    }
}
