//! Hardware drivers: peripheral bring-up, actuators, and the shaft encoder.

pub mod cleaning;
pub mod encoder;
pub mod hw_init;
pub mod motion;
pub mod status_led;
pub mod tilt;
