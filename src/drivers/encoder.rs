//! Quadrature encoder position tracking for the tilt shaft.
//!
//! Position lives in a module-level `AtomicI32` so the ISR (which receives no
//! context argument) and the rest of the firmware share it without locks.
//! Only the ISR and [`reset_position`] ever write it.
//!
//! Decode scheme: interrupt on channel A rising edge, sample channel B.
//! B LOW at the A edge means forward rotation (count up), B HIGH means
//! reverse (count down).  One count per A edge — quarter resolution, plenty
//! for a geared tilt axis.

use core::sync::atomic::{AtomicI32, Ordering};

use crate::drivers::hw_init;
use crate::pins;

static POSITION: AtomicI32 = AtomicI32::new(0);

/// Pure decode step, shared by the real ISR and host tests.
#[inline]
pub fn isr_record_edge(b_low: bool) {
    if b_low {
        POSITION.fetch_add(1, Ordering::Relaxed);
    } else {
        POSITION.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Called from the GPIO ISR on every channel-A rising edge.
///
/// ISR-safe: one pin read and one atomic add, no allocation, no locks.
pub fn encoder_isr_handler() {
    let b_high = hw_init::gpio_read(pins::ENCODER_B_GPIO);
    isr_record_edge(!b_high);
}

/// Current shaft position in encoder counts.  Single atomic load — safe to
/// call from any task while the ISR is live.
pub fn position() -> i32 {
    POSITION.load(Ordering::Relaxed)
}

/// Re-zero the position.  Called when homing completes; the new zero is the
/// mechanical reference for all subsequent moves.
pub fn reset_position() {
    POSITION.store(0, Ordering::Relaxed);
}

/// Panel axis angle in degrees, derived from the count and the configured
/// pulses-per-revolution and gearing.
pub fn angle_degrees(config: &crate::config::SystemConfig) -> f64 {
    f64::from(position()) * 360.0 / f64::from(config.pulses_per_output_rev())
}
