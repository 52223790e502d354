//! Panel output current sense (hall-effect sensor on ADC1).
//!
//! The sensor sits at half rail with zero current and swings 185 mV/A, so
//! conversion is a straight-line map from the raw 12-bit reading.

use crate::drivers::hw_init;
use crate::pins;

const ADC_FULL_SCALE: f32 = 4095.0;
const ADC_REF_VOLTS: f32 = 3.3;
/// Sensor output with zero current flowing.
const ZERO_CURRENT_VOLTS: f32 = 1.65;
/// ACS712-05B transfer slope.
const VOLTS_PER_AMP: f32 = 0.185;

/// Convert a raw ADC reading to amps.  Pure, so the mapping is testable
/// without hardware.
pub fn raw_to_amps(raw: u16) -> f32 {
    let volts = f32::from(raw) / ADC_FULL_SCALE * ADC_REF_VOLTS;
    (volts - ZERO_CURRENT_VOLTS) / VOLTS_PER_AMP
}

/// Sample the current-sense channel once.
pub fn read_amps() -> f32 {
    raw_to_amps(hw_init::adc1_read(pins::ADC1_CH_CURRENT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_reads_zero_amps() {
        // 1.65 V is raw 2047.5; both neighbours are within a few mA of zero.
        assert!(raw_to_amps(2048).abs() < 0.05);
    }

    #[test]
    fn above_midpoint_is_positive() {
        assert!(raw_to_amps(3000) > 0.0);
        assert!(raw_to_amps(1000) < 0.0);
    }

    #[test]
    fn one_amp_is_185mv_above_midpoint() {
        // 1.835 V ≈ raw 2277.
        let amps = raw_to_amps(2277);
        assert!((amps - 1.0).abs() < 0.05);
    }
}
