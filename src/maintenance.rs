//! Unattended maintenance trigger.
//!
//! A cleaning cycle fires when the panel looks dirty (output current below
//! threshold, or both IR sensors seeing debris) and the cooldown since the
//! last cycle has elapsed.  Evaluated by the control task only outside
//! manual override.

use log::info;

use crate::config::SystemConfig;
use crate::sensors::SensorSnapshot;

pub struct MaintenanceGate {
    cooldown_ms: u64,
    current_threshold_amps: f32,
    /// `None` until the first trigger, so the first dirty reading can fire
    /// immediately after boot.
    last_trigger_ms: Option<u64>,
}

impl MaintenanceGate {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            cooldown_ms: u64::from(config.cleaning_cooldown_secs) * 1_000,
            current_threshold_amps: config.current_threshold_amps,
            last_trigger_ms: None,
        }
    }

    /// Evaluate the trigger predicate; records the trigger time when it
    /// fires so the cooldown restarts.
    pub fn should_trigger(&mut self, snapshot: &SensorSnapshot, now_ms: u64) -> bool {
        let dirty = snapshot.below_current_threshold(self.current_threshold_amps)
            || snapshot.obstruction_detected();
        if !dirty {
            return false;
        }
        if let Some(last) = self.last_trigger_ms {
            if now_ms.saturating_sub(last) <= self.cooldown_ms {
                return false;
            }
        }
        self.last_trigger_ms = Some(now_ms);
        info!(
            "maintenance: triggering cleaning (current={:.2}A, obstruction={})",
            snapshot.panel_current_amps,
            snapshot.obstruction_detected()
        );
        true
    }

    pub fn in_cooldown(&self, now_ms: u64) -> bool {
        self.last_trigger_ms
            .is_some_and(|last| now_ms.saturating_sub(last) <= self.cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(amps: f32, ir1: bool, ir2: bool) -> SensorSnapshot {
        SensorSnapshot {
            panel_current_amps: amps,
            ir1_blocked: ir1,
            ir2_blocked: ir2,
        }
    }

    fn gate() -> MaintenanceGate {
        // Defaults: 0.5 A threshold, 60 s cooldown.
        MaintenanceGate::new(&SystemConfig::default())
    }

    #[test]
    fn clean_panel_never_triggers() {
        let mut g = gate();
        assert!(!g.should_trigger(&snap(1.5, false, false), 0));
        assert!(!g.should_trigger(&snap(1.5, true, false), 10_000));
    }

    #[test]
    fn low_current_triggers() {
        let mut g = gate();
        assert!(g.should_trigger(&snap(0.1, false, false), 0));
    }

    #[test]
    fn obstruction_triggers_even_with_good_current() {
        let mut g = gate();
        assert!(g.should_trigger(&snap(2.0, true, true), 0));
    }

    #[test]
    fn cooldown_blocks_retrigger() {
        let mut g = gate();
        assert!(g.should_trigger(&snap(0.1, false, false), 1_000));
        assert!(g.in_cooldown(30_000));
        assert!(!g.should_trigger(&snap(0.1, false, false), 30_000));
        // Exactly at the boundary still blocked; past it fires again.
        assert!(!g.should_trigger(&snap(0.1, false, false), 61_000));
        assert!(g.should_trigger(&snap(0.1, false, false), 61_001));
    }

    #[test]
    fn cooldown_restarts_on_each_trigger() {
        let mut g = gate();
        assert!(g.should_trigger(&snap(0.1, false, false), 0));
        assert!(g.should_trigger(&snap(0.1, false, false), 70_000));
        assert!(!g.should_trigger(&snap(0.1, false, false), 120_000));
    }
}
