//! BLE credential provisioning adapter.
//!
//! A minimal GATT server: one service with a writable SSID characteristic, a
//! writable password characteristic, and a read+notify status characteristic
//! used to stream connection progress back to the phone.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via raw
//!   `esp_idf_svc::sys` calls.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                      | Perms       |
//! |----------------|---------------------------|-------------|
//! | WiFi SSID      | `7c2e0002-…-91b4c6d8e5f2` | Write       |
//! | WiFi Password  | `7c2e0003-…-91b4c6d8e5f2` | Write       |
//! | Link Status    | `7c2e0004-…-91b4c6d8e5f2` | Read+Notify |

use core::fmt::Write as _;

use log::{error, info, warn};

use crate::adapters::nvs::{WifiCredentials, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use crate::error::ProvisioningError;

pub const SERVICE_UUID: u128 = 0x7c2e0001_93da_47f5_b1a8_91b4c6d8e5f2;
pub const CHAR_WIFI_SSID: u128 = 0x7c2e0002_93da_47f5_b1a8_91b4c6d8e5f2;
pub const CHAR_WIFI_PASS: u128 = 0x7c2e0003_93da_47f5_b1a8_91b4c6d8e5f2;
pub const CHAR_STATUS: u128 = 0x7c2e0004_93da_47f5_b1a8_91b4c6d8e5f2;

const MAX_STATUS_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

/// Role the channel plays, chosen once at [`BleAdapter::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleMode {
    /// Accept identity/secret writes and stream status back.
    Provisioning,
    /// Status-out only; credential writes are ignored.
    StatusBroadcast,
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn sanitize_ble_string(raw: &[u8], max_len: usize) -> Result<&str, ProvisioningError> {
    if raw.len() > max_len {
        return Err(ProvisioningError::DataTooLong);
    }
    core::str::from_utf8(raw).map_err(|_| ProvisioningError::InvalidUtf8)
}

fn validate_ssid(ssid: &str) -> Result<(), ProvisioningError> {
    if ssid.is_empty() || !is_printable_ascii(ssid) {
        return Err(ProvisioningError::InvalidIdentity);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ProvisioningError> {
    // A pair is only complete with both halves non-empty; WPA2 needs 8+
    // bytes anyway, so anything shorter is rejected at the slot.
    if password.len() < 8 {
        return Err(ProvisioningError::InvalidSecret);
    }
    Ok(())
}

// ── ESP-IDF BLE static state ──────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures.  These statics bridge the callback context to the adapter;
// connection events land in the events queue.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(u32::MAX);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_SSID_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_PASS_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_STATUS_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CHAR_STEP: AtomicU32 = AtomicU32::new(0);

// GATTS write callbacks run in the Bluedroid task (not ISR), so std Mutex
// is safe here.
#[cfg(target_os = "espidf")]
static BLE_SSID_BUF: std::sync::Mutex<heapless::Vec<u8, MAX_SSID_LEN>> =
    std::sync::Mutex::new(heapless::Vec::new());
#[cfg(target_os = "espidf")]
static BLE_PASS_BUF: std::sync::Mutex<heapless::Vec<u8, MAX_PASSWORD_LEN>> =
    std::sync::Mutex::new(heapless::Vec::new());

/// Consume SSID bytes written by the BLE peer.
#[cfg(target_os = "espidf")]
pub fn take_ssid_data() -> Option<heapless::Vec<u8, MAX_SSID_LEN>> {
    BLE_SSID_BUF.lock().ok().and_then(|mut buf| {
        if buf.is_empty() {
            return None;
        }
        let data = buf.clone();
        buf.clear();
        Some(data)
    })
}

/// Consume password bytes written by the BLE peer.
#[cfg(target_os = "espidf")]
pub fn take_pass_data() -> Option<heapless::Vec<u8, MAX_PASSWORD_LEN>> {
    BLE_PASS_BUF.lock().ok().and_then(|mut buf| {
        if buf.is_empty() {
            return None;
        }
        let data = buf.clone();
        buf.clear();
        Some(data)
    })
}

// The host backend mirrors the callback bridge: simulated peer writes land
// in the same buffer-plus-event shape the Bluedroid callbacks produce, so
// the provisioning machine runs the identical path in tests.
#[cfg(not(target_os = "espidf"))]
mod sim {
    use super::{MAX_PASSWORD_LEN, MAX_SSID_LEN};
    use core::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    pub static SSID_BUF: Mutex<heapless::Vec<u8, MAX_SSID_LEN>> = Mutex::new(heapless::Vec::new());
    pub static PASS_BUF: Mutex<heapless::Vec<u8, MAX_PASSWORD_LEN>> =
        Mutex::new(heapless::Vec::new());
    pub static PEER_ATTACHED: AtomicBool = AtomicBool::new(false);
}

#[cfg(not(target_os = "espidf"))]
pub fn take_ssid_data() -> Option<heapless::Vec<u8, MAX_SSID_LEN>> {
    let mut buf = sim::SSID_BUF.lock().unwrap();
    if buf.is_empty() {
        return None;
    }
    let data = buf.clone();
    buf.clear();
    Some(data)
}

#[cfg(not(target_os = "espidf"))]
pub fn take_pass_data() -> Option<heapless::Vec<u8, MAX_PASSWORD_LEN>> {
    let mut buf = sim::PASS_BUF.lock().unwrap();
    if buf.is_empty() {
        return None;
    }
    let data = buf.clone();
    buf.clear();
    Some(data)
}

/// Host test hook: attach or detach the simulated peer.
#[cfg(not(target_os = "espidf"))]
pub fn sim_peer_attach(attached: bool) {
    sim::PEER_ATTACHED.store(attached, core::sync::atomic::Ordering::Relaxed);
}

/// Host test hook: a peer writes the identity characteristic.
#[cfg(not(target_os = "espidf"))]
pub fn sim_peer_write_ssid(raw: &[u8]) {
    let mut buf = sim::SSID_BUF.lock().unwrap();
    buf.clear();
    let _ = buf.extend_from_slice(raw);
    crate::events::push_event(crate::events::Event::IdentityWritten);
}

/// Host test hook: a peer writes the secret characteristic.
#[cfg(not(target_os = "espidf"))]
pub fn sim_peer_write_password(raw: &[u8]) {
    let mut buf = sim::PASS_BUF.lock().unwrap();
    buf.clear();
    let _ = buf.extend_from_slice(raw);
    crate::events::push_event(crate::events::Event::SecretWritten);
}

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(uuid);
    esp_ble_gatts_add_char(
        svc_handle,
        &mut char_uuid,
        perm as esp_gatt_perm_t,
        prop as esp_gatt_char_prop_t,
        core::ptr::null_mut(),
        core::ptr::null_mut(),
    );
}

#[cfg(target_os = "espidf")]
unsafe fn start_advertising() {
    use esp_idf_svc::sys::*;
    let mut adv_params = esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x40,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..core::mem::zeroed()
    };
    esp_ble_gap_start_advertising(&mut adv_params);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    BLE_GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            log::info!("BLE GATTS: app registered (if={})", gatts_if);
            let svc_uuid = uuid128_to_esp(SERVICE_UUID);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: svc_uuid,
                    inst_id: 0,
                },
                is_primary: true,
            };
            esp_ble_gatts_create_service(gatts_if, &mut svc_id, 10);
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let p = unsafe { &(*param).create };
            let svc_handle = p.service_handle;
            BLE_SVC_HANDLE.store(svc_handle as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: service created (handle={})", svc_handle);
            esp_ble_gatts_start_service(svc_handle);
            BLE_CHAR_STEP.store(1, AtomicOrdering::Relaxed);
            unsafe {
                add_gatt_char(
                    svc_handle,
                    CHAR_WIFI_SSID,
                    ESP_GATT_PERM_WRITE,
                    ESP_GATT_CHAR_PROP_BIT_WRITE,
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let p = unsafe { &(*param).add_char };
            let handle = p.attr_handle;
            let step = BLE_CHAR_STEP.load(AtomicOrdering::Relaxed);
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            match step {
                1 => {
                    BLE_SSID_CHAR_HANDLE.store(handle as u32, AtomicOrdering::Relaxed);
                    BLE_CHAR_STEP.store(2, AtomicOrdering::Relaxed);
                    unsafe {
                        add_gatt_char(
                            svc_handle,
                            CHAR_WIFI_PASS,
                            ESP_GATT_PERM_WRITE,
                            ESP_GATT_CHAR_PROP_BIT_WRITE,
                        );
                    }
                }
                2 => {
                    BLE_PASS_CHAR_HANDLE.store(handle as u32, AtomicOrdering::Relaxed);
                    BLE_CHAR_STEP.store(3, AtomicOrdering::Relaxed);
                    unsafe {
                        add_gatt_char(
                            svc_handle,
                            CHAR_STATUS,
                            ESP_GATT_PERM_READ,
                            ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                        );
                    }
                }
                3 => {
                    BLE_STATUS_CHAR_HANDLE.store(handle as u32, AtomicOrdering::Relaxed);
                    BLE_CHAR_STEP.store(4, AtomicOrdering::Relaxed);
                    log::info!("BLE GATTS: all characteristics registered");
                }
                _ => {}
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            BLE_CONN_ID.store(p.conn_id as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: peer connected (conn_id={})", p.conn_id);
            crate::events::push_event(crate::events::Event::PeerConnected);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            BLE_CONN_ID.store(u32::MAX, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: peer disconnected");
            crate::events::push_event(crate::events::Event::PeerDisconnected);
            // Advertising stops on connect; restart so the next peer can
            // find us.
            unsafe { start_advertising() };
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            let handle = p.handle as u32;
            let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };

            if handle == BLE_SSID_CHAR_HANDLE.load(AtomicOrdering::Relaxed) {
                if let Ok(mut buf) = BLE_SSID_BUF.lock() {
                    buf.clear();
                    let _ = buf.extend_from_slice(data);
                }
                crate::events::push_event(crate::events::Event::IdentityWritten);
            } else if handle == BLE_PASS_CHAR_HANDLE.load(AtomicOrdering::Relaxed) {
                if let Ok(mut buf) = BLE_PASS_BUF.lock() {
                    buf.clear();
                    let _ = buf.extend_from_slice(data);
                }
                crate::events::push_event(crate::events::Event::SecretWritten);
            }
        }
        _ => {}
    }
}

// ── Adapter ───────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    mode: BleMode,
    pending_ssid: Option<heapless::String<MAX_SSID_LEN>>,
    pending_password: Option<heapless::String<MAX_PASSWORD_LEN>>,
    last_status: heapless::String<MAX_STATUS_BYTES>,
    device_name: heapless::String<24>,
}

impl BleAdapter {
    pub fn new(device_name: heapless::String<24>) -> Self {
        Self {
            state: BleState::Idle,
            mode: BleMode::Provisioning,
            pending_ssid: None,
            pending_password: None,
            last_status: heapless::String::new(),
            device_name,
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    pub fn mode(&self) -> BleMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, BleState::Advertising | BleState::Connected)
    }

    /// Start the stack in the given role and begin advertising.
    pub fn start(&mut self, mode: BleMode) -> Result<(), ProvisioningError> {
        info!(
            "BLE: starting in {:?} mode, advertising as '{}'",
            mode, self.device_name
        );
        self.mode = mode;
        self.platform_start()?;
        self.state = BleState::Advertising;
        Ok(())
    }

    /// Tear the stack down and drop any half-written credentials.
    pub fn stop(&mut self) {
        self.platform_stop();
        self.state = BleState::Idle;
        self.pending_ssid = None;
        self.pending_password = None;
        info!("BLE: stopped");
    }

    // ── Event reactions (driven by the provisioning machine) ──

    pub fn on_peer_connected(&mut self) {
        info!("BLE: peer connected");
        self.state = BleState::Connected;
    }

    pub fn on_peer_disconnected(&mut self) {
        info!("BLE: peer disconnected");
        if self.state != BleState::Idle {
            self.state = BleState::Advertising;
        }
    }

    pub fn on_ssid_write(&mut self, raw: &[u8]) -> Result<(), ProvisioningError> {
        if self.mode != BleMode::Provisioning {
            warn!("BLE: SSID write ignored in {:?} mode", self.mode);
            return Ok(());
        }
        let s = sanitize_ble_string(raw, MAX_SSID_LEN)?;
        validate_ssid(s)?;
        self.pending_ssid =
            Some(heapless::String::try_from(s).map_err(|_| ProvisioningError::InvalidIdentity)?);
        info!("BLE: SSID written (len={})", s.len());
        Ok(())
    }

    pub fn on_password_write(&mut self, raw: &[u8]) -> Result<(), ProvisioningError> {
        if self.mode != BleMode::Provisioning {
            warn!("BLE: password write ignored in {:?} mode", self.mode);
            return Ok(());
        }
        let s = sanitize_ble_string(raw, MAX_PASSWORD_LEN)?;
        validate_password(s)?;
        self.pending_password =
            Some(heapless::String::try_from(s).map_err(|_| ProvisioningError::InvalidSecret)?);
        info!("BLE: password written (len={})", s.len());
        Ok(())
    }

    /// Both fields present → consume them as one credential pair.  SSID
    /// without a password stays pending until the password write arrives.
    pub fn take_pending_credentials(&mut self) -> Option<WifiCredentials> {
        if self.pending_ssid.is_none() || self.pending_password.is_none() {
            return None;
        }
        let ssid = self.pending_ssid.take()?;
        let password = self.pending_password.take()?;
        Some(WifiCredentials { ssid, password })
    }

    /// Push a status string ("CONNECTING", "IP:…", "FAILED", "READY:…") to
    /// the connected peer via notify.
    pub fn send_status(&mut self, status: &str) {
        self.last_status.clear();
        if write!(self.last_status, "{}", status).is_err() {
            warn!("BLE: status payload truncated ({} bytes)", status.len());
        }
        self.platform_send_status();
        info!("BLE: status -> {}", self.last_status);
    }

    #[cfg(test)]
    pub fn last_status(&self) -> &str {
        &self.last_status
    }

    // ── Platform-specific ────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), ProvisioningError> {
        use esp_idf_svc::sys::*;
        // SAFETY: Bluedroid bring-up sequence from the single provisioning
        // task; callbacks only touch the static bridge state above.
        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            if esp_bt_controller_init(&mut bt_cfg) != ESP_OK {
                error!("BLE: bt_controller_init failed");
                self.state = BleState::Failed;
                return Err(ProvisioningError::StackInitFailed);
            }
            if esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE) != ESP_OK {
                error!("BLE: bt_controller_enable failed");
                self.state = BleState::Failed;
                return Err(ProvisioningError::StackInitFailed);
            }
            if esp_bluedroid_init() != ESP_OK || esp_bluedroid_enable() != ESP_OK {
                error!("BLE: bluedroid init/enable failed");
                self.state = BleState::Failed;
                return Err(ProvisioningError::StackInitFailed);
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);

            esp_ble_gap_set_device_name(self.device_name.as_ptr() as *const _);
            start_advertising();
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> Result<(), ProvisioningError> {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("BLE(sim): stopped");
    }

    #[cfg(target_os = "espidf")]
    fn platform_send_status(&mut self) {
        use esp_idf_svc::sys::*;
        let handle = BLE_STATUS_CHAR_HANDLE.load(AtomicOrdering::Relaxed);
        let conn = BLE_CONN_ID.load(AtomicOrdering::Relaxed);
        if handle == 0 || conn == u32::MAX {
            // No notify target; the status stays readable but nobody is told.
            error!(
                "BLE: status '{}' dropped: {}",
                self.last_status,
                ProvisioningError::NoPeerAttached
            );
            return;
        }
        unsafe {
            esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as u8,
                conn as u16,
                handle as u16,
                self.last_status.len() as u16,
                self.last_status.as_ptr() as *mut u8,
                false,
            );
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_send_status(&mut self) {
        if !sim::PEER_ATTACHED.load(core::sync::atomic::Ordering::Relaxed) {
            error!(
                "BLE: status '{}' dropped: {}",
                self.last_status,
                ProvisioningError::NoPeerAttached
            );
        }
    }
}
