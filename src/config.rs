//! System configuration parameters.
//!
//! All tunable parameters for the tracker.  Board revisions disagreed on
//! several of these constants, so none of them is a compile-time define:
//! values load from NVS at boot and can be persisted back after validation.

use serde::{Deserialize, Serialize};

/// Core system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Cleaning drive ---
    /// PWM duty applied during cleaning runs (0-255).
    pub cleaning_duty: u8,
    /// Minimum spacing between unattended maintenance cycles (seconds).
    pub cleaning_cooldown_secs: u32,
    /// Per-direction run time of one maintenance cycle (milliseconds).
    pub cleaning_cycle_run_ms: u32,
    /// Pause between the forward and reverse legs (milliseconds).
    pub cleaning_cycle_pause_ms: u32,

    // --- Tilt drive ---
    /// Step pulse assert/deassert hold time (microseconds).
    pub step_pulse_width_us: u32,
    /// Encoder pulses per motor revolution.
    pub pulses_per_revolution: u32,
    /// Gearbox reduction between motor shaft and panel axis.
    pub gear_ratio: u32,

    // --- Sensing ---
    /// Panel current below this value suggests degraded output (amps).
    pub current_threshold_amps: f32,

    // --- Connectivity ---
    /// Association status polls per connection attempt.
    pub wifi_max_retries: u32,
    /// Interval between association status polls (milliseconds).
    pub wifi_poll_interval_ms: u32,

    // --- Timing ---
    /// Remote time refresh period (seconds).
    pub time_refresh_secs: u32,
    /// Sun position recompute period (seconds).
    pub solar_refresh_secs: u32,
    /// Control/sensing task pass interval (milliseconds).
    pub control_interval_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Cleaning
            cleaning_duty: 200,
            cleaning_cooldown_secs: 60,
            cleaning_cycle_run_ms: 2_000,
            cleaning_cycle_pause_ms: 500,

            // Tilt
            step_pulse_width_us: 800,
            pulses_per_revolution: 400,
            gear_ratio: 10,

            // Sensing
            current_threshold_amps: 0.5,

            // Connectivity
            wifi_max_retries: 20,
            wifi_poll_interval_ms: 500,

            // Timing
            time_refresh_secs: 60,
            solar_refresh_secs: 5,
            control_interval_ms: 100, // 10 Hz is plenty for decision making
        }
    }
}

impl SystemConfig {
    /// Pulses corresponding to one full revolution of the panel axis.
    pub fn pulses_per_output_rev(&self) -> u32 {
        self.pulses_per_revolution * self.gear_ratio
    }

    /// Range-check every field before persistence or application.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.cleaning_duty == 0 {
            return Err("cleaning_duty must be 1-255");
        }
        if !(1..=3600).contains(&self.cleaning_cooldown_secs) {
            return Err("cleaning_cooldown_secs must be 1-3600");
        }
        if !(100..=60_000).contains(&self.cleaning_cycle_run_ms) {
            return Err("cleaning_cycle_run_ms must be 100-60000");
        }
        if self.cleaning_cycle_pause_ms > 10_000 {
            return Err("cleaning_cycle_pause_ms must be <= 10000");
        }
        if !(10..=10_000).contains(&self.step_pulse_width_us) {
            return Err("step_pulse_width_us must be 10-10000");
        }
        if !(1..=100_000).contains(&self.pulses_per_revolution) {
            return Err("pulses_per_revolution must be 1-100000");
        }
        if !(1..=1000).contains(&self.gear_ratio) {
            return Err("gear_ratio must be 1-1000");
        }
        if !(0.0..=50.0).contains(&self.current_threshold_amps) {
            return Err("current_threshold_amps must be 0.0-50.0");
        }
        if !(1..=1000).contains(&self.wifi_max_retries) {
            return Err("wifi_max_retries must be 1-1000");
        }
        if !(50..=10_000).contains(&self.wifi_poll_interval_ms) {
            return Err("wifi_poll_interval_ms must be 50-10000");
        }
        if !(1..=86_400).contains(&self.time_refresh_secs) {
            return Err("time_refresh_secs must be 1-86400");
        }
        if !(1..=3600).contains(&self.solar_refresh_secs) {
            return Err("solar_refresh_secs must be 1-3600");
        }
        if !(10..=5000).contains(&self.control_interval_ms) {
            return Err("control_interval_ms must be 10-5000");
        }
        Ok(())
    }
}
