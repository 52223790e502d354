//! Sensor aggregation.
//!
//! The control task samples every input once per cycle into a
//! [`SensorSnapshot`]; downstream logic (maintenance, HTTP status) works
//! from the snapshot so each input is read exactly once per cycle.

pub mod current;
pub mod proximity;

/// All sensor inputs captured at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSnapshot {
    pub panel_current_amps: f32,
    pub ir1_blocked: bool,
    pub ir2_blocked: bool,
}

impl SensorSnapshot {
    /// Both IR sensors blocked at once — debris on the glass.  One sensor
    /// alone is usually a bird or a shadow edge.
    pub fn obstruction_detected(&self) -> bool {
        self.ir1_blocked && self.ir2_blocked
    }

    /// Panel producing less than expected — possibly dirty.
    pub fn below_current_threshold(&self, threshold_amps: f32) -> bool {
        self.panel_current_amps < threshold_amps
    }
}

pub struct SensorHub;

impl SensorHub {
    /// Read every input once.
    pub fn sample() -> SensorSnapshot {
        SensorSnapshot {
            panel_current_amps: current::read_amps(),
            ir1_blocked: proximity::ir1_blocked(),
            ir2_blocked: proximity::ir2_blocked(),
        }
    }

    /// Movement-safety gate consulted before any actuation command.
    ///
    /// No interlock hardware exists on the rev-B board, so this always
    /// passes; it stays in the call path so a future tilt-travel or wind
    /// sensor only has to change this one function.
    pub fn safe_to_actuate(_snapshot: &SensorSnapshot) -> bool {
        true
    }
}
