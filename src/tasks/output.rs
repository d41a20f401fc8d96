// TiltRemote — Command Output Task
//
// Writes each confirmed gesture as one line on the console stream (the link
// the host reads commands from) and drives the mode LEDs.

use std::io::Write;
use std::sync::mpsc::Receiver;

use embedded_hal::digital::OutputPin;

use crate::drivers::led::ModeIndicator;
use crate::events::RemoteEvent;

pub fn output_task<W, A, I>(events: Receiver<RemoteEvent>, mut out: W, mut leds: ModeIndicator<A, I>)
where
    W: Write,
    A: OutputPin,
    I: OutputPin,
{
    log::info!("Output task started");

    // Blocks until the sensor task sends; ends when it hangs up.
    for event in events {
        match event {
            RemoteEvent::Command(cmd) => {
                if let Err(e) = write!(out, "\r\n{}", cmd).and_then(|_| out.flush()) {
                    log::warn!("Command output failed: {}", e);
                }
            }
            RemoteEvent::ModeChanged(active) => {
                leds.show(active);
                log::info!(
                    "{}",
                    if active { "Controller mode" } else { "Idle mode" }
                );
            }
        }
    }

    log::warn!("Event channel closed — exiting output task");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::GestureCommand;
    use std::cell::Cell;
    use std::convert::Infallible;
    use std::rc::Rc;
    use std::sync::mpsc;

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
    fn writes_one_line_per_command_and_tracks_mode() {
        let (tx, rx) = mpsc::channel();
        let (green, red) = (Led::default(), Led::default());

        tx.send(RemoteEvent::ModeChanged(true)).unwrap();
        tx.send(RemoteEvent::Command(GestureCommand::Forward)).unwrap();
        tx.send(RemoteEvent::Command(GestureCommand::Forward)).unwrap();
        tx.send(RemoteEvent::Command(GestureCommand::MoveLeft)).unwrap();
        drop(tx);

        let mut out = Vec::new();
        output_task(rx, &mut out, ModeIndicator::new(green.clone(), red.clone()));

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\r\nforward\r\nforward\r\nmove left"
        );
        assert!(green.0.get());
        assert!(!red.0.get());
    }
}
