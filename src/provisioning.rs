//! Boot-time connectivity bring-up.
//!
//! Stored credentials are tried first.  If they work, BLE comes up in
//! status-broadcast mode so a nearby phone can read the station address.
//! Otherwise the stored pair is wiped and the device advertises for
//! provisioning: a peer writes SSID and password over GATT, the machine
//! attempts the connection and streams progress back (`CONNECTING...`,
//! `IP:…` / `FAILED`).  A completed pair is persisted the moment both
//! halves arrive; a failed attempt wipes it again.  On success the final
//! status is held on air briefly so the peer sees it, then the BLE stack
//! shuts down.
//!
//! GATT callbacks cannot run this logic themselves; they only queue
//! [`Event`]s, which [`Provisioner::service`] drains on its own task.

use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::adapters::ble::{self, BleAdapter, BleMode};
use crate::adapters::nvs::{NvsAdapter, WifiCredentials};
use crate::adapters::wifi::WifiAdapter;
use crate::config::SystemConfig;
use crate::error::Result;
use crate::events::{self, Event};
use crate::state::SystemState;

/// How long the final status stays on air before the stack shuts down,
/// giving the peer time to read it.
const STATUS_HOLD_MS: u64 = 4_000;

const SERVICE_POLL_MS: u64 = 100;

/// Where the bring-up ended, reported to the caller so it knows whether a
/// broadcast-mode BLE channel is still alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    /// Stored credentials worked; BLE stays up broadcasting the address.
    StoredCredentials,
    /// A peer provisioned new credentials; BLE has been shut down.
    Provisioned,
}

pub struct Provisioner<'a> {
    ble: BleAdapter,
    wifi: &'a mut WifiAdapter,
    nvs: &'a NvsAdapter,
    state: &'a SystemState,
    config: &'a SystemConfig,
    status_hold_ms: u64,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        ble: BleAdapter,
        wifi: &'a mut WifiAdapter,
        nvs: &'a NvsAdapter,
        state: &'a SystemState,
        config: &'a SystemConfig,
    ) -> Self {
        Self {
            ble,
            wifi,
            nvs,
            state,
            config,
            status_hold_ms: STATUS_HOLD_MS,
        }
    }

    /// Shorten the status hold; tests use 0 so they do not sleep for real.
    pub fn with_status_hold_ms(mut self, hold_ms: u64) -> Self {
        self.status_hold_ms = hold_ms;
        self
    }

    /// Run bring-up to completion.  Returns once the station is online.
    pub fn run(mut self) -> Result<ProvisioningOutcome> {
        if let Some(creds) = self.nvs.load_credentials().unwrap_or(None) {
            info!("provisioning: trying stored credentials for '{}'", creds.ssid);
            match self.wifi.try_connect(&creds, self.config) {
                Ok(()) => {
                    self.state.set_wifi_connected(true);
                    self.ble.start(BleMode::StatusBroadcast)?;
                    let ip = self.wifi.ip_address().unwrap_or_default();
                    let mut ready: heapless::String<64> = heapless::String::new();
                    let _ = core::fmt::write(&mut ready, format_args!("READY:{}", ip));
                    self.ble.send_status(&ready);
                    return Ok(ProvisioningOutcome::StoredCredentials);
                }
                Err(e) => {
                    // Stale credentials would otherwise wedge every boot.
                    warn!("provisioning: stored credentials failed ({}), wiping", e);
                    if let Err(se) = self.nvs.clear_credentials() {
                        warn!("provisioning: credential wipe failed: {}", se);
                    }
                }
            }
        }

        self.ble.start(BleMode::Provisioning)?;
        info!("provisioning: advertising, waiting for credentials");

        loop {
            if self.service()? {
                return Ok(ProvisioningOutcome::Provisioned);
            }
            thread::sleep(Duration::from_millis(SERVICE_POLL_MS));
        }
    }

    /// One pump of the machine: drain queued events, and if a complete
    /// credential pair is pending, attempt the connection.  Returns
    /// `Ok(true)` once the station is online and BLE has shut down.
    pub fn service(&mut self) -> Result<bool> {
        events::drain_events(|event| self.handle_event(event));

        let Some(creds) = self.complete_credentials() else {
            return Ok(false);
        };

        self.ble.send_status("CONNECTING...");
        match self.wifi.try_connect(&creds, self.config) {
            Ok(()) => {
                self.finish();
                Ok(true)
            }
            Err(e) => {
                // The pair is presumed bad; wipe it so a power cycle does
                // not boot-loop on credentials that never worked.
                warn!("provisioning: connection attempt failed: {}", e);
                self.ble.send_status("FAILED");
                if let Err(se) = self.nvs.clear_credentials() {
                    warn!("provisioning: credential wipe failed: {}", se);
                }
                Ok(false)
            }
        }
    }

    /// Consume a completed pair.  Both halves present means the pair is
    /// persisted right here, before any association attempt, so a power
    /// loss between receipt and connection keeps it.
    fn complete_credentials(&mut self) -> Option<WifiCredentials> {
        let creds = self.ble.take_pending_credentials()?;
        if let Err(e) = self.nvs.store_credentials(&creds) {
            warn!("provisioning: failed to persist credentials: {}", e);
        }
        Some(creds)
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::PeerConnected => self.ble.on_peer_connected(),
            Event::PeerDisconnected => self.ble.on_peer_disconnected(),
            Event::IdentityWritten => {
                if let Some(raw) = ble::take_ssid_data() {
                    if let Err(e) = self.ble.on_ssid_write(&raw) {
                        warn!("provisioning: rejected identity write: {}", e);
                    }
                }
            }
            Event::SecretWritten => {
                if let Some(raw) = ble::take_pass_data() {
                    if let Err(e) = self.ble.on_password_write(&raw) {
                        warn!("provisioning: rejected secret write: {}", e);
                    }
                }
            }
            // Not ours; the control phase owns these.
            Event::LimitEdge | Event::FactoryReset => {}
        }
    }

    fn finish(&mut self) {
        self.state.set_wifi_connected(true);

        let ip = self.wifi.ip_address().unwrap_or_default();
        let mut status: heapless::String<64> = heapless::String::new();
        let _ = core::fmt::write(&mut status, format_args!("IP:{}", ip));
        self.ble.send_status(&status);

        thread::sleep(Duration::from_millis(self.status_hold_ms));
        self.ble.stop();
        info!("provisioning: complete, station online at {}", ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ble::{sim_peer_write_password, sim_peer_write_ssid, BleState};
    use crate::adapters::wifi::sim_set_polls_until_up;

    // Event queue and sim buffers are process statics.

    fn make_ble() -> BleAdapter {
        BleAdapter::new(heapless::String::try_from("heliotrack").unwrap())
    }

    fn fast_config() -> SystemConfig {
        SystemConfig {
            wifi_max_retries: 2,
            wifi_poll_interval_ms: 10,
            ..Default::default()
        }
    }

    fn drain_queue() {
        while events::pop_event().is_some() {}
    }

    #[test]
    fn stored_credentials_skip_advertising() {
        let _g = crate::drivers::hw_init::sim_exclusive();
        drain_queue();
        sim_set_polls_until_up(1);

        let nvs = NvsAdapter::new().unwrap();
        nvs.store_credentials(&WifiCredentials {
            ssid: heapless::String::try_from("barnyard").unwrap(),
            password: heapless::String::try_from("password1").unwrap(),
        })
        .unwrap();

        let mut wifi = WifiAdapter::new().unwrap();
        let state = SystemState::new();
        let config = fast_config();
        let prov = Provisioner::new(make_ble(), &mut wifi, &nvs, &state, &config)
            .with_status_hold_ms(0);

        assert_eq!(prov.run().unwrap(), ProvisioningOutcome::StoredCredentials);
        assert!(state.wifi_connected());
        assert!(nvs.has_credentials());
    }

    #[test]
    fn failed_stored_credentials_are_wiped() {
        let _g = crate::drivers::hw_init::sim_exclusive();
        drain_queue();
        sim_set_polls_until_up(u32::MAX);

        let nvs = NvsAdapter::new().unwrap();
        nvs.store_credentials(&WifiCredentials {
            ssid: heapless::String::try_from("stale").unwrap(),
            password: heapless::String::try_from("oldpassword").unwrap(),
        })
        .unwrap();

        let mut wifi = WifiAdapter::new().unwrap();
        let state = SystemState::new();
        let config = fast_config();
        let mut prov = Provisioner::new(make_ble(), &mut wifi, &nvs, &state, &config)
            .with_status_hold_ms(0);

        // Drive the stored-credential branch by hand: run() would block
        // waiting for a peer, so replicate its first phase.
        let creds = nvs.load_credentials().unwrap().unwrap();
        assert!(prov.wifi.try_connect(&creds, prov.config).is_err());
        prov.nvs.clear_credentials().unwrap();
        assert!(!nvs.has_credentials());

        sim_set_polls_until_up(1);
    }

    #[test]
    fn peer_writes_provision_and_shut_down_ble() {
        let _g = crate::drivers::hw_init::sim_exclusive();
        drain_queue();
        sim_set_polls_until_up(1);

        let nvs = NvsAdapter::new().unwrap();
        let mut wifi = WifiAdapter::new().unwrap();
        let state = SystemState::new();
        let config = fast_config();
        let mut prov = Provisioner::new(make_ble(), &mut wifi, &nvs, &state, &config)
            .with_status_hold_ms(0);
        prov.ble.start(BleMode::Provisioning).unwrap();

        events::push_event(Event::PeerConnected);
        sim_peer_write_ssid(b"barnyard");
        assert!(!prov.service().unwrap());

        sim_peer_write_password(b"password1");
        assert!(prov.service().unwrap());

        assert!(state.wifi_connected());
        assert!(nvs.has_credentials());
        assert_eq!(
            nvs.load_credentials().unwrap().unwrap().ssid.as_str(),
            "barnyard"
        );
        assert_eq!(prov.ble.state(), BleState::Idle);
    }

    #[test]
    fn completed_pair_is_persisted_before_any_attempt() {
        let _g = crate::drivers::hw_init::sim_exclusive();
        drain_queue();

        let nvs = NvsAdapter::new().unwrap();
        let mut wifi = WifiAdapter::new().unwrap();
        let state = SystemState::new();
        let config = fast_config();
        let mut prov = Provisioner::new(make_ble(), &mut wifi, &nvs, &state, &config)
            .with_status_hold_ms(0);
        prov.ble.start(BleMode::Provisioning).unwrap();

        sim_peer_write_ssid(b"barnyard");
        sim_peer_write_password(b"password1");
        events::drain_events(|event| prov.handle_event(event));

        let creds = prov.complete_credentials().unwrap();
        assert_eq!(creds.ssid.as_str(), "barnyard");
        assert!(
            nvs.has_credentials(),
            "pair must hit the store before the association attempt"
        );
    }

    #[test]
    fn failed_attempt_keeps_advertising() {
        let _g = crate::drivers::hw_init::sim_exclusive();
        drain_queue();
        sim_set_polls_until_up(u32::MAX);

        let nvs = NvsAdapter::new().unwrap();
        let mut wifi = WifiAdapter::new().unwrap();
        let state = SystemState::new();
        let config = fast_config();
        let mut prov = Provisioner::new(make_ble(), &mut wifi, &nvs, &state, &config)
            .with_status_hold_ms(0);
        prov.ble.start(BleMode::Provisioning).unwrap();

        sim_peer_write_ssid(b"barnyard");
        sim_peer_write_password(b"wrongpassword");
        assert!(!prov.service().unwrap());

        assert_eq!(prov.ble.last_status(), "FAILED");
        assert!(prov.ble.is_active());
        assert!(!state.wifi_connected());
        assert!(!nvs.has_credentials());

        sim_set_polls_until_up(1);
    }

    #[test]
    fn rejected_write_does_not_complete_pair() {
        let _g = crate::drivers::hw_init::sim_exclusive();
        drain_queue();

        let nvs = NvsAdapter::new().unwrap();
        let mut wifi = WifiAdapter::new().unwrap();
        let state = SystemState::new();
        let config = fast_config();
        let mut prov = Provisioner::new(make_ble(), &mut wifi, &nvs, &state, &config)
            .with_status_hold_ms(0);
        prov.ble.start(BleMode::Provisioning).unwrap();

        sim_peer_write_ssid(b"barnyard");
        sim_peer_write_password(b"short");
        assert!(!prov.service().unwrap());
        assert!(!state.wifi_connected());
    }
}
