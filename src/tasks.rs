//! Scheduled background units: time-sync watch, solar refresh, and the
//! control/sensing loop.
//!
//! Each unit is a named `std::thread` with a bounded sleep; the per-pass
//! logic lives in free functions (`solar_pass`, `control_pass`) so the
//! scheduling shell stays trivial and the decisions are testable on the
//! host.  Under manual override the control unit keeps servicing an
//! already-running cleaning cycle and the LED, but makes no autonomous
//! actuation decision.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::adapters::nvs::NvsAdapter;
use crate::adapters::time::TimeAdapter;
use crate::config::SystemConfig;
use crate::drivers::motion::MotionSystem;
use crate::drivers::status_led::{LedPattern, StatusLed};
use crate::events::{self, Event};
use crate::maintenance::MaintenanceGate;
use crate::sensors::{SensorHub, SensorSnapshot};
use crate::solar::SolarCalculator;
use crate::state::SystemState;

const TASK_STACK_BYTES: usize = 8 * 1024;

/// LED pattern for the current phase.
pub fn select_led_pattern(state: &SystemState) -> LedPattern {
    if !state.system_initialized() {
        LedPattern::Waiting
    } else if state.manual_override() {
        LedPattern::Manual
    } else {
        LedPattern::Tracking
    }
}

/// One solar refresh: recompute the sun position from the current
/// coordinates and publish it.  No-op until the gatekeeper is unlocked.
/// The calculator is rebuilt each pass so a re-synced coordinate pair
/// takes effect immediately.
pub fn solar_pass(state: &SystemState, unix_time_ms: i64) -> bool {
    if !state.system_initialized() {
        return false;
    }
    let (lat, lon) = state.coordinates();
    let Ok(calc) = SolarCalculator::new(lat, lon) else {
        warn!("solar: stored coordinates out of range ({}, {})", lat, lon);
        return false;
    };
    let angles = calc.position(unix_time_ms);
    state.set_sun_angles(angles.azimuth_deg, angles.elevation_deg);
    true
}

/// One control pass over a sensor snapshot taken by the caller.
pub fn control_pass(
    state: &SystemState,
    motion: &MotionSystem,
    gate: &mut MaintenanceGate,
    led: &StatusLed,
    snapshot: &SensorSnapshot,
    now_ms: u64,
) {
    led.set_pattern(select_led_pattern(state));
    led.update(now_ms);

    // A cycle in flight advances regardless of mode; manual commands
    // cancel it through the motion facade instead.
    motion.service_cycle(now_ms);

    if !state.system_initialized()
        || state.manual_override()
        || !SensorHub::safe_to_actuate(snapshot)
    {
        return;
    }

    // First actuation after unlock is the homing run; the pulse loop
    // drives the axis, this only issues the command.
    if !motion.tilt_homed() && !motion.tilt_moving() {
        motion.home_tilt();
    }

    if !motion.cycle_active() && gate.should_trigger(snapshot, now_ms) {
        motion.run_cleaning_cycle(now_ms);
    }
}

fn handle_event(event: Event, nvs: &NvsAdapter) {
    match event {
        Event::LimitEdge => info!("control: tilt axis reached home limit"),
        Event::FactoryReset => {
            warn!("control: factory reset requested, wiping credentials");
            if let Err(e) = nvs.clear_credentials() {
                warn!("control: credential wipe failed: {}", e);
            }
            restart_device();
        }
        // Pairing traffic after provisioning has handed off: stale.
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
fn restart_device() {
    unsafe { esp_idf_svc::sys::esp_restart() }
}

#[cfg(not(target_os = "espidf"))]
fn restart_device() {
    warn!("control: restart requested (ignored on host)");
}

/// Spawn the three background units.  Threads run for the life of the
/// process; the returned handles are only joined in tests.
pub fn spawn_all(
    state: &'static SystemState,
    motion: &'static MotionSystem,
    config: &'static SystemConfig,
    time: Arc<TimeAdapter>,
    nvs: Arc<NvsAdapter>,
) -> std::io::Result<Vec<thread::JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(3);

    let time_sync = Arc::clone(&time);
    handles.push(
        thread::Builder::new()
            .name("time-sync".into())
            .stack_size(TASK_STACK_BYTES)
            .spawn(move || {
                let mut was_synced = false;
                loop {
                    let synced = state.wifi_connected() && time_sync.is_synced();
                    if synced && !was_synced {
                        info!("time-sync: wall clock synchronised");
                    } else if !synced && was_synced {
                        warn!("time-sync: wall clock lost sync");
                    }
                    was_synced = synced;
                    thread::sleep(Duration::from_secs(u64::from(config.time_refresh_secs)));
                }
            })?,
    );

    let time_solar = Arc::clone(&time);
    handles.push(
        thread::Builder::new()
            .name("solar".into())
            .stack_size(TASK_STACK_BYTES)
            .spawn(move || loop {
                if let Some(unix_ms) = time_solar.unix_time_ms() {
                    solar_pass(state, unix_ms);
                }
                thread::sleep(Duration::from_secs(u64::from(config.solar_refresh_secs)));
            })?,
    );

    handles.push(
        thread::Builder::new()
            .name("control".into())
            .stack_size(TASK_STACK_BYTES)
            .spawn(move || {
                let led = StatusLed::new();
                let mut gate = MaintenanceGate::new(config);
                loop {
                    let now_ms = time.uptime_ms();
                    events::drain_events(|event| handle_event(event, &nvs));
                    let snapshot = SensorHub::sample();
                    control_pass(state, motion, &mut gate, &led, &snapshot, now_ms);
                    thread::sleep(Duration::from_millis(u64::from(config.control_interval_ms)));
                }
            })?,
    );

    Ok(handles)
}
