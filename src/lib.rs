// TiltRemote — Library Root
//
// The sensor sits on a two-wire bus driven by drivers::bus::BusEngine.  Once
// per period the sensor task reads one combined accelerometer/gyroscope
// sample, fuses roll and pitch, classifies the tilt into a GestureCommand and
// debounces it.  Confirmed commands go to the output task as RemoteEvents.
//
// Everything here is hardware-agnostic; the firmware entry point supplies the
// GPIO lines, delays and threads.

pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod fusion;
pub mod gesture;
pub mod input;
pub mod tasks;

pub use error::{BusError, BusFault, DeviceError};
