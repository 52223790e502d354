//! Tilt axis stepper driver (step/dir/enable) with limit-switch homing.
//!
//! Command functions only update state; physical stepping happens in
//! [`TiltDrive::tick`], called from the unthrottled pulse loop.  All state
//! is interior-atomic so HTTP handlers and the control task command the
//! axis through `&self` while the pulse loop runs.

use core::sync::atomic::{AtomicBool, AtomicI8, Ordering};

use log::info;

use crate::drivers::{encoder, hw_init};
use crate::events::{push_event, Event};
use crate::pins;

/// Commanded tilt motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiltMotion {
    Idle,
    /// Toward higher encoder counts (panel tilts up, away from the switch).
    Raising,
    /// Toward lower encoder counts (panel tilts down, toward the switch).
    Lowering,
}

pub struct TiltDrive {
    // -1 lowering, 0 idle, 1 raising.
    motion: AtomicI8,
    /// Limit level seen on the previous tick, for edge detection.  The
    /// switch is active LOW; `true` here means "was pressed".
    limit_was_active: AtomicBool,
    /// Set on the first limit edge; encoder zero is meaningless before it.
    homed: AtomicBool,
}

impl TiltDrive {
    pub fn new() -> Self {
        Self {
            motion: AtomicI8::new(0),
            // Seed from the real level so a switch held closed at boot
            // does not fire a phantom edge on the first tick.
            limit_was_active: AtomicBool::new(limit_active()),
            homed: AtomicBool::new(false),
        }
    }

    /// Command a motion state.  Writes the DIR line once and gates the
    /// driver enable (active LOW); the pulse loop does the stepping.
    pub fn set_direction(&self, motion: TiltMotion) {
        let state = match motion {
            TiltMotion::Raising => {
                hw_init::gpio_write(pins::TILT_DIR_GPIO, true);
                hw_init::gpio_write(pins::TILT_ENA_GPIO, false);
                1
            }
            TiltMotion::Lowering => {
                hw_init::gpio_write(pins::TILT_DIR_GPIO, false);
                hw_init::gpio_write(pins::TILT_ENA_GPIO, false);
                -1
            }
            TiltMotion::Idle => {
                hw_init::gpio_write(pins::TILT_ENA_GPIO, true);
                0
            }
        };
        let prev = self.motion.swap(state, Ordering::Relaxed);
        if prev != state {
            info!("tilt: {:?}", motion);
        }
    }

    /// Drive toward the limit switch; the edge handler in `tick` stops the
    /// axis and zeroes the encoder.
    pub fn home(&self) {
        info!("tilt: homing toward limit switch");
        self.set_direction(TiltMotion::Lowering);
    }

    pub fn stop(&self) {
        self.set_direction(TiltMotion::Idle);
    }

    pub fn motion(&self) -> TiltMotion {
        match self.motion.load(Ordering::Relaxed) {
            1 => TiltMotion::Raising,
            -1 => TiltMotion::Lowering,
            _ => TiltMotion::Idle,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.motion() != TiltMotion::Idle
    }

    pub fn is_homed(&self) -> bool {
        self.homed.load(Ordering::Relaxed)
    }

    /// One pulse-loop iteration.
    ///
    /// Samples the limit switch every call.  An inactive-to-active edge
    /// zeroes the encoder, forces the axis stopped, and latches until the
    /// switch releases; a held switch fires exactly once.  Otherwise, if a
    /// motion is commanded, emits exactly one step pulse.  The only
    /// blocking is the pulse-width hold; no logging on the pulse path.
    pub fn tick(&self, pulse_width_us: u32) {
        let active = limit_active();
        let was = self.limit_was_active.swap(active, Ordering::Relaxed);
        if active && !was {
            encoder::reset_position();
            self.motion.store(0, Ordering::Relaxed);
            hw_init::gpio_write(pins::TILT_ENA_GPIO, true);
            self.homed.store(true, Ordering::Relaxed);
            // The control task logs the latched event; nothing logs here.
            push_event(Event::LimitEdge);
            return;
        }

        if self.motion.load(Ordering::Relaxed) == 0 {
            return;
        }

        hw_init::gpio_write(pins::TILT_STEP_GPIO, true);
        hw_init::delay_us(pulse_width_us);
        hw_init::gpio_write(pins::TILT_STEP_GPIO, false);
        hw_init::delay_us(pulse_width_us);
    }
}

impl Default for TiltDrive {
    fn default() -> Self {
        Self::new()
    }
}

fn limit_active() -> bool {
    // Active LOW with pull-up.
    !hw_init::gpio_read(pins::LIMIT_GPIO)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Encoder position, sim GPIO map, and the event queue are process
    // statics; serialise tests that touch them.

    fn release_limit() {
        hw_init::sim_set_gpio(pins::LIMIT_GPIO, true);
    }

    fn press_limit() {
        hw_init::sim_set_gpio(pins::LIMIT_GPIO, false);
    }

    fn drain_queue() {
        while crate::events::pop_event().is_some() {}
    }

    #[test]
    fn homing_stops_on_limit_edge_and_zeroes_encoder() {
        let _g = hw_init::sim_exclusive();
        release_limit();
        drain_queue();
        encoder::reset_position();
        encoder::isr_record_edge(true);
        encoder::isr_record_edge(true);

        let drive = TiltDrive::new();
        drive.home();
        assert!(drive.is_moving());

        drive.tick(1);
        assert!(drive.is_moving(), "must keep moving while switch open");

        press_limit();
        drive.tick(1);
        assert!(!drive.is_moving());
        assert!(drive.is_homed());
        assert_eq!(encoder::position(), 0);
        assert_eq!(crate::events::pop_event(), Some(Event::LimitEdge));
        release_limit();
    }

    #[test]
    fn held_switch_fires_exactly_once() {
        let _g = hw_init::sim_exclusive();
        release_limit();
        drain_queue();

        let drive = TiltDrive::new();
        drive.home();
        press_limit();
        drive.tick(1);
        assert!(!drive.is_moving());

        // Switch still held: raising away must not retrigger the latch.
        drive.set_direction(TiltMotion::Raising);
        drive.tick(1);
        drive.tick(1);
        assert!(drive.is_moving());
        assert_eq!(crate::events::pop_event(), Some(Event::LimitEdge));
        assert_eq!(crate::events::pop_event(), None);
        drive.stop();
        release_limit();
    }

    #[test]
    fn switch_pressed_at_construction_needs_fresh_edge() {
        let _g = hw_init::sim_exclusive();
        press_limit();
        drain_queue();

        let drive = TiltDrive::new();
        drive.home();
        drive.tick(1);
        assert!(
            drive.is_moving(),
            "level held since boot must not count as an edge"
        );

        release_limit();
        drive.tick(1);
        press_limit();
        drive.tick(1);
        assert!(!drive.is_moving());
        assert!(drive.is_homed());
        release_limit();
        drain_queue();
    }

    #[test]
    fn idle_axis_emits_no_pulses() {
        let _g = hw_init::sim_exclusive();
        release_limit();
        hw_init::sim_set_gpio(pins::TILT_STEP_GPIO, false);

        let drive = TiltDrive::new();
        drive.tick(1);
        assert!(!hw_init::gpio_read(pins::TILT_STEP_GPIO));
        assert_eq!(drive.motion(), TiltMotion::Idle);
    }

    #[test]
    fn stop_disables_driver() {
        let _g = hw_init::sim_exclusive();
        release_limit();
        let drive = TiltDrive::new();
        drive.set_direction(TiltMotion::Lowering);
        assert!(!hw_init::gpio_read(pins::TILT_ENA_GPIO), "enable active LOW");
        drive.stop();
        assert!(hw_init::gpio_read(pins::TILT_ENA_GPIO));
        assert!(!drive.is_moving());
    }
}
