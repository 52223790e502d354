//! Integration tests: network API → shared state → motion system.
//!
//! Runs on host only; hardware calls land in the simulation backends.

#![cfg(not(target_os = "espidf"))]

use heliotrack::api::{handle_encoder, handle_mode, handle_motor, handle_status, handle_update};
use heliotrack::config::SystemConfig;
use heliotrack::drivers::motion::MotionSystem;
use heliotrack::drivers::tilt::TiltMotion;
use heliotrack::drivers::{encoder, hw_init};
use heliotrack::pins;
use heliotrack::state::SystemState;

fn fixture() -> (SystemState, MotionSystem, SystemConfig) {
    // Limit switch idle (pull-up high = not pressed).
    hw_init::sim_set_gpio(pins::LIMIT_GPIO, true);
    encoder::reset_position();
    let config = SystemConfig::default();
    (SystemState::new(), MotionSystem::new(&config), config)
}

fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap()
}

#[test]
fn full_sync_flow_unlocks_control() {
    let _g = hw_init::sim_exclusive();
    let (state, motion, config) = fixture();

    // Phase 1: everything controllable is locked out.
    assert_eq!(
        json(&handle_status(&state, &motion, &config).body)["status"],
        "WAITING_FOR_SYNC"
    );
    assert_eq!(handle_mode(&state, &motion, "manual=1").code, 403);
    assert_eq!(handle_motor(&state, &motion, &config, "type=tilt&dir=1").code, 403);
    assert!(!motion.tilt_moving());

    // Phone delivers coordinates.
    let resp = handle_update(&state, br#"{"lat": 51.5, "lon": -0.12}"#);
    assert_eq!(resp.code, 200);
    assert_eq!(
        json(&resp.body)["message"],
        "Sync Complete. Tracking Started."
    );

    // Phase 2: tracking, and control endpoints answer.
    assert_eq!(json(&handle_status(&state, &motion, &config).body)["status"], "AUTO");
    assert_eq!(handle_mode(&state, &motion, "manual=1").body, "Manual Mode");
    assert_eq!(json(&handle_status(&state, &motion, &config).body)["status"], "MANUAL");
}

#[test]
fn jog_then_auto_resume_parks_actuators() {
    let _g = hw_init::sim_exclusive();
    let (state, motion, config) = fixture();
    handle_update(&state, br#"{"lat": 48.1, "lon": 11.6}"#);

    // Jogging flips the override on implicitly.
    handle_motor(&state, &motion, &config, "type=all&dir=-1");
    assert!(state.manual_override());
    assert!(motion.tilt_moving());
    assert!(motion.cleaning_running());

    // Back to auto: everything halts.
    let resp = handle_mode(&state, &motion, "manual=0");
    assert_eq!(resp.body, "Auto Mode");
    assert!(!motion.tilt_moving());
    assert!(!motion.cleaning_running());
    assert!(!state.manual_override());
}

#[test]
fn manual_jog_raises_until_override_cleared() {
    let _g = hw_init::sim_exclusive();
    let (state, motion, config) = fixture();
    handle_update(&state, br#"{"lat": 48.1, "lon": 11.6}"#);

    assert_eq!(handle_mode(&state, &motion, "manual=1").body, "Manual Mode");
    handle_motor(&state, &motion, &config, "type=tilt&dir=1");
    assert!(state.manual_override());
    assert_eq!(motion.tilt_motion(), TiltMotion::Raising);

    // Clearing the override parks the axis exactly once.
    handle_mode(&state, &motion, "manual=0");
    assert_eq!(motion.tilt_motion(), TiltMotion::Idle);
    assert!(!motion.tilt_moving());
}

#[test]
fn status_carries_solar_fix_and_coordinates() {
    let _g = hw_init::sim_exclusive();
    let (state, motion, config) = fixture();
    handle_update(&state, br#"{"lat": -33.9, "lon": 18.4}"#);
    state.set_sun_angles(271.5, 12.25);

    let v = json(&handle_status(&state, &motion, &config).body);
    assert!((v["lat"].as_f64().unwrap() + 33.9).abs() < 1e-9);
    assert!((v["lon"].as_f64().unwrap() - 18.4).abs() < 1e-9);
    assert!((v["azimuth"].as_f64().unwrap() - 271.5).abs() < 1e-9);
    assert!((v["elevation"].as_f64().unwrap() - 12.25).abs() < 1e-9);
    assert_eq!(v["override"], false);
    assert_eq!(v["position"], 0);
    assert_eq!(v["homed"], false);
}

#[test]
fn encoder_endpoint_reports_and_resets_position() {
    let _g = hw_init::sim_exclusive();
    let (_, motion, config) = fixture();
    let v = json(&handle_encoder(&motion, &config, "").body);
    assert_eq!(v["position"], 0);
    assert_eq!(v["homed"], false);
    assert_eq!(v["moving"], false);

    encoder::isr_record_edge(true);
    assert_eq!(json(&handle_encoder(&motion, &config, "").body)["position"], 1);
    let v = json(&handle_encoder(&motion, &config, "action=reset").body);
    assert_eq!(v["position"], 0);
}

#[test]
fn invalid_update_leaves_system_locked() {
    let _g = hw_init::sim_exclusive();
    let (state, motion, config) = fixture();
    assert_eq!(handle_update(&state, b"{}").code, 400);
    assert_eq!(handle_update(&state, b"lat=1&lon=2").code, 400);
    assert_eq!(handle_motor(&state, &motion, &config, "type=tilt&dir=1").code, 403);
    assert!(!state.system_initialized());
}
