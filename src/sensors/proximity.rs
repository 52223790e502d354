//! IR reflective sensors watching the panel surface.
//!
//! The modules pull their output LOW when they see a reflection.  A single
//! blocked sensor is usually a bird or a shadow edge; both blocked together
//! is treated as debris on the glass.

use crate::drivers::hw_init;
use crate::pins;

/// One sensor sees a reflection (output LOW).
fn blocked(pin: i32) -> bool {
    !hw_init::gpio_read(pin)
}

pub fn ir1_blocked() -> bool {
    blocked(pins::IR_1_GPIO)
}

pub fn ir2_blocked() -> bool {
    blocked(pins::IR_2_GPIO)
}

/// Debris detection: both sensors blocked simultaneously.
pub fn debris_detected() -> bool {
    ir1_blocked() && ir2_blocked()
}
