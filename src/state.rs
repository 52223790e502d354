//! Process-wide phase state — the gatekeeper container.
//!
//! Every cross-task flag lives here as a typed atomic with exactly one
//! producer:
//!
//! | Field                | Writer                         | Readers            |
//! |----------------------|--------------------------------|--------------------|
//! | `wifi_connected`     | provisioning machine (boot)    | time-sync task     |
//! | `system_initialized` | network API `update` handler   | solar/control task |
//! | `manual_override`    | network API `mode`/`motor`     | control task       |
//! | `latitude/longitude` | network API `update` handler   | solar task         |
//! | `azimuth/elevation`  | solar task                     | network API        |
//!
//! There is **no** snapshot consistency across fields: a consumer reading
//! two flags may observe them from different instants and must tolerate
//! that.  `system_initialized` is monotonic — it latches true once per boot
//! and there is no clear path short of a reset.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared phase flags and solar fix.  Construct once and share by
/// `&'static` reference across every task.
pub struct SystemState {
    wifi_connected: AtomicBool,
    system_initialized: AtomicBool,
    manual_override: AtomicBool,

    // f64 fields stored bit-cast; a single writer each, so a plain
    // store/load pair is sufficient (no read-modify-write cycles).
    latitude: AtomicU64,
    longitude: AtomicU64,
    azimuth: AtomicU64,
    elevation: AtomicU64,
}

impl SystemState {
    pub const fn new() -> Self {
        Self {
            wifi_connected: AtomicBool::new(false),
            system_initialized: AtomicBool::new(false),
            manual_override: AtomicBool::new(false),
            latitude: AtomicU64::new(0),
            longitude: AtomicU64::new(0),
            azimuth: AtomicU64::new(0),
            elevation: AtomicU64::new(0),
        }
    }

    // ── Phase flags ───────────────────────────────────────────

    pub fn wifi_connected(&self) -> bool {
        self.wifi_connected.load(Ordering::Acquire)
    }

    /// Writer: provisioning machine only.
    pub fn set_wifi_connected(&self, connected: bool) {
        self.wifi_connected.store(connected, Ordering::Release);
    }

    pub fn system_initialized(&self) -> bool {
        self.system_initialized.load(Ordering::Acquire)
    }

    /// Latch the gatekeeper.  Returns `true` only on the first call of the
    /// process lifetime; repeats are no-ops.
    pub fn mark_initialized(&self) -> bool {
        self.system_initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn manual_override(&self) -> bool {
        self.manual_override.load(Ordering::Acquire)
    }

    /// Writer: network API handlers only.
    pub fn set_manual_override(&self, on: bool) {
        self.manual_override.store(on, Ordering::Release);
    }

    // ── Solar fix ─────────────────────────────────────────────

    pub fn coordinates(&self) -> (f64, f64) {
        (
            f64::from_bits(self.latitude.load(Ordering::Acquire)),
            f64::from_bits(self.longitude.load(Ordering::Acquire)),
        )
    }

    /// Writer: network API `update` handler only.
    pub fn set_coordinates(&self, lat: f64, lon: f64) {
        self.latitude.store(lat.to_bits(), Ordering::Release);
        self.longitude.store(lon.to_bits(), Ordering::Release);
    }

    pub fn sun_angles(&self) -> (f64, f64) {
        (
            f64::from_bits(self.azimuth.load(Ordering::Acquire)),
            f64::from_bits(self.elevation.load(Ordering::Acquire)),
        )
    }

    /// Writer: solar refresh task only.
    pub fn set_sun_angles(&self, azimuth: f64, elevation: f64) {
        self.azimuth.store(azimuth.to_bits(), Ordering::Release);
        self.elevation.store(elevation.to_bits(), Ordering::Release);
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new()
    }
}
