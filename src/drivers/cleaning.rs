//! Cleaning brush motor — brushed DC on an IBT-2 H-bridge, two LEDC channels.
//!
//! One channel per rotation direction.  The bridge shorts its supply if both
//! inputs carry PWM simultaneously, so every direction change zeroes the
//! opposite channel before raising the active one.

use core::sync::atomic::{AtomicI8, Ordering};

use log::info;

use crate::drivers::hw_init::{self, LEDC_CH_CLEAN_L, LEDC_CH_CLEAN_R};

/// Commanded brush rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushDirection {
    Stopped,
    Forward,
    Reverse,
}

impl BrushDirection {
    fn as_i8(self) -> i8 {
        match self {
            Self::Stopped => 0,
            Self::Forward => 1,
            Self::Reverse => -1,
        }
    }
}

/// Cleaning motor driver.  Interior-atomic state so the control task and the
/// HTTP handler can share one instance behind `&self`.
pub struct CleaningMotor {
    // -1 reverse, 0 stopped, 1 forward; mirrors the LEDC register state.
    direction: AtomicI8,
}

impl CleaningMotor {
    pub const fn new() -> Self {
        Self {
            direction: AtomicI8::new(0),
        }
    }

    /// Apply a direction and duty.  Always clears the opposite bridge input
    /// first; with `Stopped` both inputs go to zero.
    pub fn set(&self, direction: BrushDirection, duty: u8) {
        match direction {
            BrushDirection::Forward => {
                hw_init::ledc_set(LEDC_CH_CLEAN_L, 0);
                hw_init::ledc_set(LEDC_CH_CLEAN_R, duty);
            }
            BrushDirection::Reverse => {
                hw_init::ledc_set(LEDC_CH_CLEAN_R, 0);
                hw_init::ledc_set(LEDC_CH_CLEAN_L, duty);
            }
            BrushDirection::Stopped => {
                hw_init::ledc_set(LEDC_CH_CLEAN_R, 0);
                hw_init::ledc_set(LEDC_CH_CLEAN_L, 0);
            }
        }
        let prev = self.direction.swap(direction.as_i8(), Ordering::Relaxed);
        if prev != direction.as_i8() {
            info!("cleaning motor: {:?} duty={}", direction, duty);
        }
    }

    pub fn stop(&self) {
        self.set(BrushDirection::Stopped, 0);
    }

    pub fn direction(&self) -> BrushDirection {
        match self.direction.load(Ordering::Relaxed) {
            1 => BrushDirection::Forward,
            -1 => BrushDirection::Reverse,
            _ => BrushDirection::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.direction() != BrushDirection::Stopped
    }
}

impl Default for CleaningMotor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // LEDC sim duties are process-global.

    #[test]
    fn forward_drives_right_channel_only() {
        let _g = hw_init::sim_exclusive();
        let motor = CleaningMotor::new();
        motor.set(BrushDirection::Forward, 200);
        assert_eq!(hw_init::sim_ledc_duty(LEDC_CH_CLEAN_R), 200);
        assert_eq!(hw_init::sim_ledc_duty(LEDC_CH_CLEAN_L), 0);
        assert!(motor.is_running());
        motor.stop();
    }

    #[test]
    fn reversal_clears_opposite_channel() {
        let _g = hw_init::sim_exclusive();
        let motor = CleaningMotor::new();
        motor.set(BrushDirection::Forward, 180);
        motor.set(BrushDirection::Reverse, 180);
        assert_eq!(hw_init::sim_ledc_duty(LEDC_CH_CLEAN_R), 0);
        assert_eq!(hw_init::sim_ledc_duty(LEDC_CH_CLEAN_L), 180);
        assert_eq!(motor.direction(), BrushDirection::Reverse);
        motor.stop();
    }

    #[test]
    fn stop_zeroes_both_channels() {
        let _g = hw_init::sim_exclusive();
        let motor = CleaningMotor::new();
        motor.set(BrushDirection::Reverse, 255);
        motor.stop();
        assert_eq!(hw_init::sim_ledc_duty(LEDC_CH_CLEAN_R), 0);
        assert_eq!(hw_init::sim_ledc_duty(LEDC_CH_CLEAN_L), 0);
        assert!(!motor.is_running());
    }
}
