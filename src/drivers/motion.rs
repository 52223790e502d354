//! Actuation facade: one struct owning the tilt axis and cleaning motor.
//!
//! Shared as `&'static MotionSystem` between the pulse loop, the control
//! task, and the HTTP handlers.  Every method takes `&self`; the drivers
//! underneath keep their own interior-atomic state.
//!
//! The maintenance cleaning cycle is a small non-blocking phase machine:
//! [`MotionSystem::run_cleaning_cycle`] arms it and the control task drives
//! it forward with [`MotionSystem::service_cycle`], so a cycle never stalls
//! the task that triggered it.

use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use log::info;

use crate::config::SystemConfig;
use crate::drivers::cleaning::{BrushDirection, CleaningMotor};
use crate::drivers::encoder;
use crate::drivers::tilt::{TiltDrive, TiltMotion};

const CYCLE_IDLE: u8 = 0;
const CYCLE_FORWARD: u8 = 1;
const CYCLE_PAUSE: u8 = 2;
const CYCLE_REVERSE: u8 = 3;

pub struct MotionSystem {
    tilt: TiltDrive,
    cleaning: CleaningMotor,
    pulse_width_us: u32,
    cleaning_duty: u8,
    cycle_run_ms: u64,
    cycle_pause_ms: u64,
    cycle_phase: AtomicU8,
    cycle_deadline_ms: AtomicU64,
}

impl MotionSystem {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            tilt: TiltDrive::new(),
            cleaning: CleaningMotor::new(),
            pulse_width_us: config.step_pulse_width_us,
            cleaning_duty: config.cleaning_duty,
            cycle_run_ms: u64::from(config.cleaning_cycle_run_ms),
            cycle_pause_ms: u64::from(config.cleaning_cycle_pause_ms),
            cycle_phase: AtomicU8::new(CYCLE_IDLE),
            cycle_deadline_ms: AtomicU64::new(0),
        }
    }

    /// Pulse-loop entry point.  Must stay non-blocking beyond the step
    /// pulse hold.
    pub fn tick(&self) {
        self.tilt.tick(self.pulse_width_us);
    }

    // ── Tilt ─────────────────────────────────────────────────

    pub fn home_tilt(&self) {
        self.tilt.home();
    }

    pub fn set_tilt(&self, motion: TiltMotion) {
        self.tilt.set_direction(motion);
    }

    pub fn tilt_motion(&self) -> TiltMotion {
        self.tilt.motion()
    }

    pub fn tilt_moving(&self) -> bool {
        self.tilt.is_moving()
    }

    pub fn tilt_homed(&self) -> bool {
        self.tilt.is_homed()
    }

    // ── Cleaning ─────────────────────────────────────────────

    pub fn set_cleaning(&self, direction: BrushDirection, duty: u8) {
        // Manual command cancels any automated cycle in flight.
        self.cycle_phase.store(CYCLE_IDLE, Ordering::Relaxed);
        self.cleaning.set(direction, duty);
    }

    pub fn cleaning_running(&self) -> bool {
        self.cleaning.is_running()
    }

    /// Arm the automated maintenance cycle: brush forward, pause, brush
    /// reverse, stop.  Returns immediately; `service_cycle` advances it.
    pub fn run_cleaning_cycle(&self, now_ms: u64) {
        info!("motion: cleaning cycle started");
        self.cycle_deadline_ms
            .store(now_ms + self.cycle_run_ms, Ordering::Relaxed);
        self.cycle_phase.store(CYCLE_FORWARD, Ordering::Relaxed);
        self.cleaning.set(BrushDirection::Forward, self.cleaning_duty);
    }

    /// Advance the cleaning cycle.  Called from the control task each pass.
    pub fn service_cycle(&self, now_ms: u64) {
        let phase = self.cycle_phase.load(Ordering::Relaxed);
        if phase == CYCLE_IDLE || now_ms < self.cycle_deadline_ms.load(Ordering::Relaxed) {
            return;
        }
        match phase {
            CYCLE_FORWARD => {
                self.cleaning.stop();
                self.cycle_deadline_ms
                    .store(now_ms + self.cycle_pause_ms, Ordering::Relaxed);
                self.cycle_phase.store(CYCLE_PAUSE, Ordering::Relaxed);
            }
            CYCLE_PAUSE => {
                self.cleaning.set(BrushDirection::Reverse, self.cleaning_duty);
                self.cycle_deadline_ms
                    .store(now_ms + self.cycle_run_ms, Ordering::Relaxed);
                self.cycle_phase.store(CYCLE_REVERSE, Ordering::Relaxed);
            }
            CYCLE_REVERSE => {
                self.cleaning.stop();
                self.cycle_phase.store(CYCLE_IDLE, Ordering::Relaxed);
                info!("motion: cleaning cycle complete");
            }
            _ => {}
        }
    }

    pub fn cycle_active(&self) -> bool {
        self.cycle_phase.load(Ordering::Relaxed) != CYCLE_IDLE
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn encoder_position(&self) -> i32 {
        encoder::position()
    }

    /// Manually declare the current tilt position the new zero.  Same
    /// atomic store the homing edge performs.
    pub fn reset_encoder(&self) {
        encoder::reset_position();
        info!("motion: encoder zeroed by request");
    }

    pub fn angle_degrees(&self, config: &SystemConfig) -> f64 {
        encoder::angle_degrees(config)
    }

    // ── Global ───────────────────────────────────────────────

    /// Halt every actuator and cancel any cycle.  Safe from any task.
    pub fn stop_all(&self) {
        self.cycle_phase.store(CYCLE_IDLE, Ordering::Relaxed);
        self.tilt.stop();
        self.cleaning.stop();
        info!("motion: all actuators stopped");
    }
}
