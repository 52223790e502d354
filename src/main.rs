//! Heliotrack Firmware — Main Entry Point
//!
//! Boot sequence and task topology:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ boot: peripherals → NVS/config → provisioning (BLE⇄WiFi) → NTP │
//! │                                                                │
//! │  time-sync task      solar task         control task           │
//! │  (SNTP watch)        (sun position →    (sensors, maintenance  │
//! │                       shared state)      gate, status LED)     │
//! │                                                                │
//! │  HTTP API (/status /mode /motor /encoder /update) + mDNS       │
//! │                                                                │
//! │  main thread → hard-real-time pulse loop (tilt step pulses,    │
//! │                limit-switch homing, console polling)           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The gatekeeper flag in [`state::SystemState`] keeps every actuator
//! parked until a phone delivers coordinates through `/update`.
#![deny(unused_must_use)]

// ── Module declarations ───────────────────────────────────────
pub mod config;
mod error;
mod events;
mod pins;
mod state;

mod adapters;
mod api;
mod console;
mod drivers;
mod maintenance;
mod provisioning;
mod sensors;
mod solar;
mod tasks;

// ── Imports ───────────────────────────────────────────────────
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::info;

use adapters::ble::BleAdapter;
use adapters::nvs::NvsAdapter;
use adapters::time::TimeAdapter;
use adapters::wifi::WifiAdapter;
use config::SystemConfig;
use drivers::motion::MotionSystem;
use error::Error;
use provisioning::{Provisioner, ProvisioningOutcome};
use state::SystemState;

static SYSTEM_STATE: SystemState = SystemState::new();

const IDLE_LOOP_SLEEP_MS: u64 = 1;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }
    #[cfg(not(target_os = "espidf"))]
    env_logger_fallback();

    info!("╔══════════════════════════════════════╗");
    info!("║  Heliotrack v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // Give a brownout-prone supply a moment to settle before the radio
    // and motor drivers start pulling current.
    thread::sleep(Duration::from_millis(100));

    // ── 2. Peripherals ────────────────────────────────────────
    if let Err(e) = drivers::hw_init::init_peripherals() {
        // Peripheral init failure is critical — log and halt; the
        // watchdog resets the chip after timeout.
        log::error!("HAL init failed: {} — halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = drivers::hw_init::init_isr_service() {
        log::error!("ISR service init failed: {} — continuing without encoder", e);
    }
    console::init();

    // ── 3. Config from NVS (or defaults) ──────────────────────
    let nvs = Arc::new(NvsAdapter::new().map_err(Error::from)?);
    let config: &'static SystemConfig = Box::leak(Box::new(nvs.load_config()));
    let state: &'static SystemState = &SYSTEM_STATE;
    let motion: &'static MotionSystem = Box::leak(Box::new(MotionSystem::new(config)));

    // ── 4. Connectivity bring-up ──────────────────────────────
    #[cfg(target_os = "espidf")]
    let mut wifi = {
        let peripherals = esp_idf_svc::hal::peripherals::Peripherals::take()
            .map_err(|_| Error::Init("peripherals taken twice"))?;
        let sysloop = esp_idf_svc::eventloop::EspSystemEventLoop::take()
            .map_err(|_| Error::Init("system event loop"))?;
        let nvs_partition = esp_idf_svc::nvs::EspDefaultNvsPartition::take()
            .map_err(|_| Error::Init("nvs partition"))?;
        WifiAdapter::new(peripherals.modem, sysloop, nvs_partition).map_err(Error::from)?
    };
    #[cfg(not(target_os = "espidf"))]
    let mut wifi = WifiAdapter::new().map_err(Error::from)?;

    let ble = BleAdapter::new(
        heapless::String::try_from(api::MDNS_HOSTNAME)
            .map_err(|()| Error::Init("device name too long"))?,
    );
    let outcome = Provisioner::new(ble, &mut wifi, &nvs, state, config).run()?;
    match outcome {
        ProvisioningOutcome::StoredCredentials => {
            info!("boot: online with stored credentials, BLE broadcasting address");
        }
        ProvisioningOutcome::Provisioned => info!("boot: provisioned by peer, BLE released"),
    }

    // ── 5. Wall clock ─────────────────────────────────────────
    let time = Arc::new(TimeAdapter::new().map_err(Error::from)?);

    // ── 6. Network API + background tasks ─────────────────────
    // The control task commands the homing run once the gatekeeper
    // unlocks; until then the axis stays parked.
    #[cfg(target_os = "espidf")]
    let _api_handles = api::espidf_server::serve(state, motion, config)?;

    let _task_handles = tasks::spawn_all(state, motion, config, Arc::clone(&time), nvs)?;

    info!("System ready. Waiting for coordinate sync on /update.");

    // ── 7. Pulse loop ─────────────────────────────────────────
    // The main thread becomes the step generator.  Each tick emits at
    // most one pulse and samples the limit switch; the console is polled
    // only in the gaps so motion timing stays first.
    loop {
        motion.tick();
        if !motion.tilt_moving() {
            console::poll(motion, config);
            thread::sleep(Duration::from_millis(IDLE_LOOP_SLEEP_MS));
        }
    }
}

/// Plain stderr logging for host runs, where the IDF logger is absent.
#[cfg(not(target_os = "espidf"))]
fn env_logger_fallback() {
    struct StderrLog;
    impl log::Log for StderrLog {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }
        fn log(&self, record: &log::Record) {
            eprintln!("{:5} {}", record.level(), record.args());
        }
        fn flush(&self) {}
    }
    static LOGGER: StderrLog = StderrLog;
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}
