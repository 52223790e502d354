//! Network control API.
//!
//! Endpoints are pure functions over the shared state and motion system so
//! every branch is testable on the host; the espidf-only
//! [`serve`](self::espidf_server::serve) function binds them to an
//! `EspHttpServer` and announces the device over mDNS.
//!
//! `update` is the only path that unlocks the gatekeeper.  Until it has
//! been called once, `mode` and `motor` answer 403 and the control task
//! keeps the hardware parked.

use log::info;
use serde_json::json;

use crate::config::SystemConfig;
use crate::drivers::cleaning::BrushDirection;
use crate::drivers::motion::MotionSystem;
use crate::drivers::tilt::TiltMotion;
use crate::state::SystemState;

pub const MDNS_HOSTNAME: &str = "heliotrack";

const NOT_SYNCED: &str = "Error: System not synced yet!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub code: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl ApiResponse {
    fn json(code: u16, body: String) -> Self {
        Self {
            code,
            content_type: "application/json",
            body,
        }
    }

    fn text(code: u16, body: &str) -> Self {
        Self {
            code,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }
}

/// Extract a query parameter value from a raw `k=v&k2=v2` string.
pub fn query_param<'q>(query: &'q str, key: &str) -> Option<&'q str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// `GET /status` — phase, override flag, solar fix, coordinates, and the
/// tilt axis (angle, raw position, homing flag).
pub fn handle_status(
    state: &SystemState,
    motion: &MotionSystem,
    config: &SystemConfig,
) -> ApiResponse {
    let (lat, lon) = state.coordinates();
    let (azimuth, elevation) = state.sun_angles();
    let status = if !state.system_initialized() {
        "WAITING_FOR_SYNC"
    } else if state.manual_override() {
        "MANUAL"
    } else {
        "AUTO"
    };
    let body = json!({
        "status": status,
        "override": state.manual_override(),
        "azimuth": azimuth,
        "elevation": elevation,
        "lat": lat,
        "lon": lon,
        "angle": motion.angle_degrees(config),
        "position": motion.encoder_position(),
        "homed": motion.tilt_homed(),
    });
    ApiResponse::json(200, body.to_string())
}

/// `GET /mode?manual=1|0` — toggle manual override.  Clearing the override
/// halts every actuator exactly once so the control task resumes from a
/// known-safe posture.
pub fn handle_mode(state: &SystemState, motion: &MotionSystem, query: &str) -> ApiResponse {
    if !state.system_initialized() {
        return ApiResponse::text(403, NOT_SYNCED);
    }
    let Some(value) = query_param(query, "manual") else {
        return ApiResponse::text(400, "Missing 'manual' parameter");
    };
    let manual = value == "1";
    let was_manual = state.manual_override();
    state.set_manual_override(manual);
    if was_manual && !manual {
        motion.stop_all();
    }
    ApiResponse::text(200, if manual { "Manual Mode" } else { "Auto Mode" })
}

fn tilt_from_dir(dir: i8) -> TiltMotion {
    match dir {
        1 => TiltMotion::Raising,
        -1 => TiltMotion::Lowering,
        _ => TiltMotion::Idle,
    }
}

fn brush_from_dir(dir: i8) -> BrushDirection {
    match dir {
        1 => BrushDirection::Forward,
        -1 => BrushDirection::Reverse,
        _ => BrushDirection::Stopped,
    }
}

/// `GET /motor?type=clean|tilt|all&dir=-1|0|1`, plus the named aliases
/// `?tilt=raise|lower|stop` and `?brush=forward|reverse|stop`.  Any
/// accepted jog forces manual override on so the control task stays out
/// of the way.  Bad values reject without touching state.
pub fn handle_motor(
    state: &SystemState,
    motion: &MotionSystem,
    config: &SystemConfig,
    query: &str,
) -> ApiResponse {
    if !state.system_initialized() {
        return ApiResponse::text(403, NOT_SYNCED);
    }

    if let Some(kind) = query_param(query, "type") {
        let Some(dir_param) = query_param(query, "dir") else {
            return ApiResponse::text(400, "Missing 'dir' parameter");
        };
        let dir: i8 = match dir_param {
            "-1" => -1,
            "0" => 0,
            "1" => 1,
            _ => return ApiResponse::text(400, "Invalid 'dir' value"),
        };
        match kind {
            "tilt" => {
                state.set_manual_override(true);
                motion.set_tilt(tilt_from_dir(dir));
            }
            "clean" => {
                state.set_manual_override(true);
                motion.set_cleaning(brush_from_dir(dir), config.cleaning_duty);
            }
            "all" => {
                state.set_manual_override(true);
                if dir == 0 {
                    motion.stop_all();
                } else {
                    motion.set_tilt(tilt_from_dir(dir));
                    motion.set_cleaning(brush_from_dir(dir), config.cleaning_duty);
                }
            }
            _ => return ApiResponse::text(400, "Invalid 'type' value"),
        }
        return ApiResponse::text(200, "Manual Mode");
    }

    let tilt_param = query_param(query, "tilt");
    let brush_param = query_param(query, "brush");
    if tilt_param.is_none() && brush_param.is_none() {
        return ApiResponse::text(400, "Missing 'type', 'tilt' or 'brush' parameter");
    }

    // Validate everything before mutating anything.
    let tilt = match tilt_param {
        None => None,
        Some("raise") => Some(TiltMotion::Raising),
        Some("lower") => Some(TiltMotion::Lowering),
        Some("stop") => Some(TiltMotion::Idle),
        Some(_) => return ApiResponse::text(400, "Invalid 'tilt' value"),
    };
    let brush = match brush_param {
        None => None,
        Some("forward") => Some(BrushDirection::Forward),
        Some("reverse") => Some(BrushDirection::Reverse),
        Some("stop") => Some(BrushDirection::Stopped),
        Some(_) => return ApiResponse::text(400, "Invalid 'brush' value"),
    };

    state.set_manual_override(true);
    if let Some(motion_cmd) = tilt {
        motion.set_tilt(motion_cmd);
    }
    if let Some(direction) = brush {
        motion.set_cleaning(direction, config.cleaning_duty);
    }
    ApiResponse::text(200, "Manual Mode")
}

/// `GET /encoder[?action=reset]` — tilt feedback diagnostics; `reset`
/// atomically re-zeroes the position before reporting.
pub fn handle_encoder(motion: &MotionSystem, config: &SystemConfig, query: &str) -> ApiResponse {
    match query_param(query, "action") {
        Some("reset") => motion.reset_encoder(),
        Some(_) => return ApiResponse::text(400, "Invalid 'action' value"),
        None => {}
    }
    let body = json!({
        "position": motion.encoder_position(),
        "angle": motion.angle_degrees(config),
        "homed": motion.tilt_homed(),
        "moving": motion.tilt_moving(),
    });
    ApiResponse::json(200, body.to_string())
}

/// `POST /update` — coordinate sync from the phone; the only gatekeeper
/// unlock path.  Rejects malformed or out-of-range payloads without
/// touching state.
pub fn handle_update(state: &SystemState, body: &[u8]) -> ApiResponse {
    const INVALID: &str = r#"{"message":"Invalid JSON"}"#;

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(body) else {
        return ApiResponse::json(400, INVALID.to_string());
    };
    let (Some(lat), Some(lon)) = (
        payload.get("lat").and_then(serde_json::Value::as_f64),
        payload.get("lon").and_then(serde_json::Value::as_f64),
    ) else {
        return ApiResponse::json(400, INVALID.to_string());
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return ApiResponse::json(400, INVALID.to_string());
    }

    state.set_coordinates(lat, lon);
    if state.mark_initialized() {
        info!("api: coordinates received, tracking unlocked");
    }

    let body = json!({
        "message": "Sync Complete. Tracking Started.",
        "received_lat": lat,
        "received_lon": lon,
    });
    ApiResponse::json(200, body.to_string())
}

#[cfg(target_os = "espidf")]
pub mod espidf_server {
    //! HTTP server + mDNS registration over the pure handlers.

    use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request};
    use esp_idf_svc::http::Method;
    use esp_idf_svc::io::{Read, Write};
    use esp_idf_svc::mdns::EspMdns;
    use log::info;

    use super::{
        handle_encoder, handle_mode, handle_motor, handle_status, handle_update, ApiResponse,
        MDNS_HOSTNAME,
    };
    use crate::config::SystemConfig;
    use crate::drivers::motion::MotionSystem;
    use crate::error::Error;
    use crate::state::SystemState;

    const UPDATE_BODY_MAX: usize = 256;

    fn send(req: Request<&mut EspHttpConnection<'_>>, resp: &ApiResponse) -> anyhow::Result<()> {
        let mut out =
            req.into_response(resp.code, None, &[("Content-Type", resp.content_type)])?;
        out.write_all(resp.body.as_bytes())?;
        Ok(())
    }

    fn uri_query(uri: &str) -> &str {
        uri.split_once('?').map_or("", |(_, q)| q)
    }

    /// Bring up the control API on port 80 and announce it over mDNS.
    /// The returned handles must stay alive for the life of the process.
    pub fn serve(
        state: &'static SystemState,
        motion: &'static MotionSystem,
        config: &'static SystemConfig,
    ) -> Result<(EspHttpServer<'static>, EspMdns), Error> {
        let mut mdns = EspMdns::take().map_err(|_| Error::Init("mdns take"))?;
        mdns.set_hostname(MDNS_HOSTNAME)
            .map_err(|_| Error::Init("mdns hostname"))?;
        mdns.add_service(None, "_http", "_tcp", 80, &[])
            .map_err(|_| Error::Init("mdns service"))?;

        let mut server = EspHttpServer::new(&Configuration::default())
            .map_err(|_| Error::Init("http server"))?;

        server
            .fn_handler::<anyhow::Error, _>("/status", Method::Get, move |req| {
                send(req, &handle_status(state, motion, config))
            })
            .map_err(|_| Error::Init("register /status"))?;

        server
            .fn_handler::<anyhow::Error, _>("/mode", Method::Get, move |req| {
                let resp = handle_mode(state, motion, uri_query(req.uri()));
                send(req, &resp)
            })
            .map_err(|_| Error::Init("register /mode"))?;

        server
            .fn_handler::<anyhow::Error, _>("/motor", Method::Get, move |req| {
                let resp = handle_motor(state, motion, config, uri_query(req.uri()));
                send(req, &resp)
            })
            .map_err(|_| Error::Init("register /motor"))?;

        server
            .fn_handler::<anyhow::Error, _>("/encoder", Method::Get, move |req| {
                let resp = handle_encoder(motion, config, uri_query(req.uri()));
                send(req, &resp)
            })
            .map_err(|_| Error::Init("register /encoder"))?;

        server
            .fn_handler::<anyhow::Error, _>("/update", Method::Post, move |mut req| {
                let mut body = [0u8; UPDATE_BODY_MAX];
                let mut len = 0;
                loop {
                    let n = req.read(&mut body[len..])?;
                    if n == 0 {
                        break;
                    }
                    len += n;
                    if len == body.len() {
                        break;
                    }
                }
                let resp = handle_update(state, &body[..len]);
                send(req, &resp)
            })
            .map_err(|_| Error::Init("register /update"))?;

        info!("api: serving on http://{}.local/", MDNS_HOSTNAME);
        Ok((server, mdns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{encoder, hw_init};
    use crate::pins;

    fn fixture() -> (SystemState, MotionSystem, SystemConfig) {
        hw_init::sim_set_gpio(pins::LIMIT_GPIO, true);
        let config = SystemConfig::default();
        (SystemState::new(), MotionSystem::new(&config), config)
    }

    fn body_json(resp: &ApiResponse) -> serde_json::Value {
        serde_json::from_str(&resp.body).unwrap()
    }

    #[test]
    fn status_reports_waiting_before_sync() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, config) = fixture();
        let resp = handle_status(&state, &motion, &config);
        assert_eq!(resp.code, 200);
        assert_eq!(body_json(&resp)["status"], "WAITING_FOR_SYNC");
    }

    #[test]
    fn status_reflects_mode_and_fix() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, config) = fixture();
        state.set_coordinates(48.1, 11.6);
        state.set_sun_angles(182.0, 35.5);
        assert!(state.mark_initialized());

        let auto = body_json(&handle_status(&state, &motion, &config));
        assert_eq!(auto["status"], "AUTO");
        assert_eq!(auto["override"], false);
        assert!((auto["azimuth"].as_f64().unwrap() - 182.0).abs() < 1e-9);
        assert!((auto["lat"].as_f64().unwrap() - 48.1).abs() < 1e-9);

        state.set_manual_override(true);
        assert_eq!(
            body_json(&handle_status(&state, &motion, &config))["status"],
            "MANUAL"
        );
    }

    #[test]
    fn status_carries_tilt_axis_fields() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, config) = fixture();
        encoder::reset_position();
        encoder::isr_record_edge(true);

        let v = body_json(&handle_status(&state, &motion, &config));
        assert_eq!(v["position"], 1);
        assert_eq!(v["homed"], false);
        assert!(v["angle"].as_f64().unwrap() > 0.0);
        encoder::reset_position();
    }

    #[test]
    fn mode_rejected_before_sync() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, _) = fixture();
        let resp = handle_mode(&state, &motion, "manual=1");
        assert_eq!(resp.code, 403);
        assert_eq!(resp.body, "Error: System not synced yet!");
        assert!(!state.manual_override());
    }

    #[test]
    fn mode_requires_parameter() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, _) = fixture();
        assert!(state.mark_initialized());
        assert_eq!(handle_mode(&state, &motion, "").code, 400);
    }

    #[test]
    fn clearing_override_stops_actuators() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, config) = fixture();
        assert!(state.mark_initialized());

        handle_motor(&state, &motion, &config, "tilt=raise");
        assert!(state.manual_override());
        assert!(motion.tilt_moving());

        let resp = handle_mode(&state, &motion, "manual=0");
        assert_eq!(resp.code, 200);
        assert_eq!(resp.body, "Auto Mode");
        assert!(!state.manual_override());
        assert!(!motion.tilt_moving());
        assert!(!motion.cleaning_running());
    }

    #[test]
    fn motor_forces_manual_override() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, config) = fixture();
        assert!(state.mark_initialized());

        let resp = handle_motor(&state, &motion, &config, "brush=forward");
        assert_eq!(resp.code, 200);
        assert!(state.manual_override());
        assert!(motion.cleaning_running());

        handle_motor(&state, &motion, &config, "brush=stop&tilt=stop");
        assert!(!motion.cleaning_running());
        assert!(!motion.tilt_moving());
    }

    #[test]
    fn motor_type_dir_scheme_commands_axes() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, config) = fixture();
        assert!(state.mark_initialized());

        let resp = handle_motor(&state, &motion, &config, "type=tilt&dir=1");
        assert_eq!(resp.code, 200);
        assert_eq!(resp.body, "Manual Mode");
        assert!(state.manual_override());
        assert_eq!(motion.tilt_motion(), TiltMotion::Raising);

        handle_motor(&state, &motion, &config, "type=tilt&dir=-1");
        assert_eq!(motion.tilt_motion(), TiltMotion::Lowering);

        handle_motor(&state, &motion, &config, "type=clean&dir=1");
        assert!(motion.cleaning_running());

        handle_motor(&state, &motion, &config, "type=all&dir=0");
        assert!(!motion.tilt_moving());
        assert!(!motion.cleaning_running());
    }

    #[test]
    fn motor_all_drives_both_axes() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, config) = fixture();
        assert!(state.mark_initialized());

        handle_motor(&state, &motion, &config, "type=all&dir=-1");
        assert_eq!(motion.tilt_motion(), TiltMotion::Lowering);
        assert!(motion.cleaning_running());
        handle_motor(&state, &motion, &config, "type=all&dir=0");
    }

    #[test]
    fn motor_rejects_bad_type_or_dir_without_mutation() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, config) = fixture();
        assert!(state.mark_initialized());

        assert_eq!(
            handle_motor(&state, &motion, &config, "type=tilt").code,
            400
        );
        assert_eq!(
            handle_motor(&state, &motion, &config, "type=tilt&dir=2").code,
            400
        );
        assert_eq!(
            handle_motor(&state, &motion, &config, "type=rotor&dir=1").code,
            400
        );
        assert!(!state.manual_override());
        assert!(!motion.tilt_moving());
        assert!(!motion.cleaning_running());
    }

    #[test]
    fn encoder_reset_rezeros_position() {
        let _g = hw_init::sim_exclusive();
        let (_, motion, config) = fixture();
        encoder::reset_position();
        encoder::isr_record_edge(true);
        encoder::isr_record_edge(true);
        assert_eq!(body_json(&handle_encoder(&motion, &config, ""))["position"], 2);

        let resp = handle_encoder(&motion, &config, "action=reset");
        assert_eq!(resp.code, 200);
        assert_eq!(body_json(&resp)["position"], 0);
        assert_eq!(motion.encoder_position(), 0);

        assert_eq!(handle_encoder(&motion, &config, "action=selftest").code, 400);
    }

    #[test]
    fn motor_rejects_bad_value_without_mutation() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, config) = fixture();
        assert!(state.mark_initialized());

        let resp = handle_motor(&state, &motion, &config, "tilt=sideways&brush=forward");
        assert_eq!(resp.code, 400);
        assert!(!state.manual_override());
        assert!(!motion.cleaning_running());
    }

    #[test]
    fn motor_rejected_before_sync() {
        let _g = hw_init::sim_exclusive();
        let (state, motion, config) = fixture();
        let resp = handle_motor(&state, &motion, &config, "tilt=raise");
        assert_eq!(resp.code, 403);
        assert!(!motion.tilt_moving());
    }

    #[test]
    fn update_unlocks_gatekeeper_once() {
        let _g = hw_init::sim_exclusive();
        let (state, _, _) = fixture();
        let resp = handle_update(&state, br#"{"lat": 48.1, "lon": 11.6}"#);
        assert_eq!(resp.code, 200);
        let v = body_json(&resp);
        assert_eq!(v["message"], "Sync Complete. Tracking Started.");
        assert!((v["received_lat"].as_f64().unwrap() - 48.1).abs() < 1e-9);
        assert!(state.system_initialized());

        // Re-sync updates coordinates but the latch stays latched.
        let resp2 = handle_update(&state, br#"{"lat": -33.9, "lon": 18.4}"#);
        assert_eq!(resp2.code, 200);
        let (lat, _) = state.coordinates();
        assert!((lat + 33.9).abs() < 1e-9);
        assert!(state.system_initialized());
    }

    #[test]
    fn update_rejects_malformed_payloads() {
        let _g = hw_init::sim_exclusive();
        let (state, _, _) = fixture();
        for bad in [
            &b"not json"[..],
            br#"{"lat": 48.1}"#,
            br#"{"lon": 11.6}"#,
            br#"{"lat": "x", "lon": 11.6}"#,
            br#"{"lat": 91.0, "lon": 11.6}"#,
            br#"{"lat": 48.1, "lon": 181.0}"#,
        ] {
            let resp = handle_update(&state, bad);
            assert_eq!(resp.code, 400, "payload {:?}", core::str::from_utf8(bad));
            assert!(!state.system_initialized());
        }
        let (lat, lon) = state.coordinates();
        assert_eq!((lat, lon), (0.0, 0.0));
    }

    #[test]
    fn query_param_parsing() {
        assert_eq!(query_param("manual=1", "manual"), Some("1"));
        assert_eq!(query_param("a=1&manual=0", "manual"), Some("0"));
        assert_eq!(query_param("", "manual"), None);
        assert_eq!(query_param("manual", "manual"), None);
    }
}
