//! WiFi station-mode adapter.
//!
//! Owns the connection attempt policy: configure the station, start the
//! driver, then poll link state a bounded number of times before declaring
//! failure.  The caller decides what a failed attempt means (fall back to
//! provisioning).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real driver via `esp_idf_svc::wifi::EspWifi`.
//! - **all other targets**: simulation with a controllable outcome so host
//!   tests can exercise both the success and retry-exhaustion paths.

use std::thread;
use std::time::Duration;

use log::{error, info};

use crate::adapters::nvs::WifiCredentials;
use crate::config::SystemConfig;
use crate::error::CommsError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi},
};

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// Credential shape check shared with the provisioning writes.
pub fn validate_credentials(creds: &WifiCredentials) -> Result<(), CommsError> {
    if creds.ssid.is_empty() || !is_printable_ascii(&creds.ssid) {
        return Err(CommsError::NoCredentials);
    }
    // WPA2 needs 8+ bytes; empty means an open network.
    if !creds.password.is_empty() && creds.password.len() < 8 {
        return Err(CommsError::NoCredentials);
    }
    Ok(())
}

pub struct WifiAdapter {
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    #[cfg(not(target_os = "espidf"))]
    sim_connected: bool,
}

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::sync::atomic::AtomicU32;

    /// Number of polls before the simulated link comes up.  u32::MAX never
    /// connects, exercising retry exhaustion.
    pub static POLLS_UNTIL_UP: AtomicU32 = AtomicU32::new(1);
}

/// Configure how many link polls the simulated driver needs before it
/// reports up (host test hook).
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_polls_until_up(polls: u32) {
    sim::POLLS_UNTIL_UP.store(polls, core::sync::atomic::Ordering::Relaxed);
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
    ) -> Result<Self, CommsError> {
        let wifi = EspWifi::new(modem, sysloop, Some(nvs_partition))
            .map_err(|_| CommsError::WifiConnectFailed)?;
        Ok(Self { wifi })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Result<Self, CommsError> {
        info!("WiFi(sim): adapter created");
        Ok(Self {
            sim_connected: false,
        })
    }

    /// One bounded connection attempt: apply credentials, start the station,
    /// then poll link state up to `wifi_max_retries` times at
    /// `wifi_poll_interval_ms` spacing.
    pub fn try_connect(
        &mut self,
        creds: &WifiCredentials,
        config: &SystemConfig,
    ) -> Result<(), CommsError> {
        validate_credentials(creds)?;
        info!("WiFi: connecting to '{}'", creds.ssid);

        self.platform_begin(creds)?;

        for attempt in 1..=config.wifi_max_retries {
            self.platform_poll();
            if self.is_connected() {
                info!("WiFi: connected after {} poll(s)", attempt);
                return Ok(());
            }
            thread::sleep(Duration::from_millis(u64::from(
                config.wifi_poll_interval_ms,
            )));
        }

        error!(
            "WiFi: no link after {} polls, giving up",
            config.wifi_max_retries
        );
        self.platform_stop();
        Err(CommsError::WifiConnectFailed)
    }

    pub fn disconnect(&mut self) {
        self.platform_stop();
        info!("WiFi: disconnected");
    }

    // ── Platform-specific ────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_begin(&mut self, creds: &WifiCredentials) -> Result<(), CommsError> {
        let auth_method = if creds.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: creds
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| CommsError::NoCredentials)?,
            password: creds
                .password
                .as_str()
                .try_into()
                .map_err(|_| CommsError::NoCredentials)?,
            auth_method,
            ..Default::default()
        };
        self.wifi
            .set_configuration(&Configuration::Client(client))
            .map_err(|_| CommsError::WifiConnectFailed)?;
        self.wifi
            .start()
            .map_err(|_| CommsError::WifiConnectFailed)?;
        self.wifi
            .connect()
            .map_err(|_| CommsError::WifiConnectFailed)?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_begin(&mut self, _creds: &WifiCredentials) -> Result<(), CommsError> {
        self.sim_connected = false;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
            && self
                .wifi
                .sta_netif()
                .get_ip_info()
                .map(|info| !info.ip.is_unspecified())
                .unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn is_connected(&self) -> bool {
        self.sim_connected
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        let _ = self.wifi.disconnect();
        let _ = self.wifi.stop();
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        self.sim_connected = false;
    }

    /// Station IPv4 address as text, for the provisioning status broadcast.
    #[cfg(target_os = "espidf")]
    pub fn ip_address(&self) -> Option<String> {
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .filter(|info| !info.ip.is_unspecified())
            .map(|info| info.ip.to_string())
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn ip_address(&self) -> Option<String> {
        self.sim_connected.then(|| "192.168.4.101".to_string())
    }
}

impl WifiAdapter {
    /// Advance driver-side link state by one poll.  Real driver needs no
    /// help; the simulation counts down to link-up here.
    #[cfg(target_os = "espidf")]
    fn platform_poll(&mut self) {}

    #[cfg(not(target_os = "espidf"))]
    fn platform_poll(&mut self) {
        use core::sync::atomic::Ordering;
        let remaining = sim::POLLS_UNTIL_UP.load(Ordering::Relaxed);
        if remaining == u32::MAX {
            return;
        }
        if remaining == 0 {
            self.sim_connected = true;
        } else {
            sim::POLLS_UNTIL_UP.store(remaining - 1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(ssid: &str, password: &str) -> WifiCredentials {
        WifiCredentials {
            ssid: heapless::String::try_from(ssid).unwrap(),
            password: heapless::String::try_from(password).unwrap(),
        }
    }

    fn fast_config() -> SystemConfig {
        SystemConfig {
            wifi_max_retries: 3,
            wifi_poll_interval_ms: 50,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_empty_ssid() {
        assert!(validate_credentials(&creds("", "password1")).is_err());
    }

    #[test]
    fn rejects_short_wpa2_password() {
        assert!(validate_credentials(&creds("barn", "short")).is_err());
    }

    #[test]
    fn accepts_open_network() {
        assert!(validate_credentials(&creds("OpenField", "")).is_ok());
    }

    #[test]
    fn connects_within_retry_budget() {
        let _g = crate::drivers::hw_init::sim_exclusive();
        sim_set_polls_until_up(1);
        let mut wifi = WifiAdapter::new().unwrap();
        wifi.try_connect(&creds("barnyard", "password1"), &fast_config())
            .unwrap();
        assert!(wifi.is_connected());
        assert!(wifi.ip_address().is_some());
        wifi.disconnect();
        assert!(!wifi.is_connected());
    }

    #[test]
    fn gives_up_after_retry_budget() {
        let _g = crate::drivers::hw_init::sim_exclusive();
        sim_set_polls_until_up(u32::MAX);
        let mut wifi = WifiAdapter::new().unwrap();
        let err = wifi
            .try_connect(&creds("barnyard", "password1"), &fast_config())
            .unwrap_err();
        assert_eq!(err, CommsError::WifiConnectFailed);
        assert!(!wifi.is_connected());
        sim_set_polls_until_up(1);
    }
}
