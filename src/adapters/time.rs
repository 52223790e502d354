//! Time adapter: monotonic uptime plus SNTP-synced wall clock.
//!
//! - **`target_os = "espidf"`** — uptime from `esp_timer_get_time()`, wall
//!   clock via the ESP-IDF SNTP service feeding `gettimeofday()`.
//! - **all other targets** — `std::time` for both; the host clock counts
//!   as synced.
//!
//! Sun-position math needs real wall-clock time, so everything that reads
//! the clock goes through [`TimeAdapter::unix_time_ms`], which returns
//! `None` until the first SNTP fix lands.

use log::info;

/// Anything before this is an unsynced RTC, not a real timestamp.
const EPOCH_2020_SECS: i64 = 1_577_836_800;

pub struct TimeAdapter {
    #[cfg(target_os = "espidf")]
    _sntp: esp_idf_svc::sntp::EspSntp<'static>,
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl TimeAdapter {
    /// Create the adapter and start the SNTP service.  Call after WiFi is
    /// up; sync completes in the background.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Result<Self, crate::error::CommsError> {
        let sntp = esp_idf_svc::sntp::EspSntp::new_default()
            .map_err(|_| crate::error::CommsError::TimeSyncFailed)?;
        info!("TimeAdapter: SNTP service started");
        Ok(Self { _sntp: sntp })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Result<Self, crate::error::CommsError> {
        info!("TimeAdapter: simulation backend (host clock)");
        Ok(Self {
            start: std::time::Instant::now(),
        })
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Seconds since boot (monotonic).
    pub fn uptime_secs(&self) -> u64 {
        self.uptime_ms() / 1_000
    }

    /// Unix time in milliseconds, `None` until the wall clock has synced.
    #[cfg(target_os = "espidf")]
    pub fn unix_time_ms(&self) -> Option<i64> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        let secs = tv.tv_sec as i64;
        if secs < EPOCH_2020_SECS {
            return None;
        }
        Some(secs * 1_000 + i64::from(tv.tv_usec as i32) / 1_000)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn unix_time_ms(&self) -> Option<i64> {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_millis() as i64)
            .filter(|&ms| ms / 1_000 >= EPOCH_2020_SECS)
    }

    pub fn is_synced(&self) -> bool {
        self.unix_time_ms().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_monotonic() {
        let t = TimeAdapter::new().unwrap();
        let a = t.uptime_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = t.uptime_ms();
        assert!(b >= a + 4);
    }

    #[test]
    fn host_clock_counts_as_synced() {
        let t = TimeAdapter::new().unwrap();
        assert!(t.is_synced());
        assert!(t.unix_time_ms().unwrap() / 1_000 > EPOCH_2020_SECS);
    }
}
