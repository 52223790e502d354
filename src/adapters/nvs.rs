//! NVS (Non-Volatile Storage) adapter.
//!
//! Two namespaces: `heliotrk` holds the postcard-encoded [`SystemConfig`]
//! blob, `wifi` holds the provisioned station credentials under the `ssid`
//! and `password` keys.  ESP-IDF NVS commits are atomic per nvs_commit();
//! the simulation backend is an in-memory map for host tests.

use log::{info, warn};

use crate::config::SystemConfig;
use crate::error::StorageError;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "heliotrk";
const CONFIG_KEY: &str = "syscfg";
const WIFI_NAMESPACE: &str = "wifi";
const SSID_KEY: &str = "ssid";
const PASSWORD_KEY: &str = "password";

const MAX_BLOB_SIZE: usize = 4000;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;

/// Station credentials as provisioned over BLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: heapless::String<MAX_SSID_LEN>,
    pub password: heapless::String<MAX_PASSWORD_LEN>,
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::sync::Mutex<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.  On first boot or after a partition-table
    /// version bump the partition is erased and re-initialised.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase run from the single
            // main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(StorageError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::sync::Mutex::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, run a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    // ── Generic blob access ──────────────────────────────────

    fn read_blob(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store
                .lock()
                .unwrap()
                .get(&composite)
                .cloned()
                .ok_or(StorageError::NotFound)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let mut size: usize = 0;
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });
            match result {
                Ok(bytes) => Ok(bytes),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store
                .lock()
                .unwrap()
                .insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }

    fn erase_namespace(&self, namespace: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let prefix = format!("{}::", namespace);
            self.store
                .lock()
                .unwrap()
                .retain(|k, _| !k.starts_with(&prefix));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_all(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    // ── System configuration ─────────────────────────────────

    /// Load the stored configuration, falling back to defaults when nothing
    /// is stored or the blob fails validation.
    pub fn load_config(&self) -> SystemConfig {
        match self.read_blob(CONFIG_NAMESPACE, CONFIG_KEY) {
            Ok(bytes) => match postcard::from_bytes::<SystemConfig>(&bytes) {
                Ok(cfg) if cfg.validate().is_ok() => {
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    cfg
                }
                Ok(_) => {
                    warn!("NvsAdapter: stored config failed validation, using defaults");
                    SystemConfig::default()
                }
                Err(_) => {
                    warn!("NvsAdapter: stored config corrupted, using defaults");
                    SystemConfig::default()
                }
            },
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                SystemConfig::default()
            }
            Err(e) => {
                warn!("NvsAdapter: config read error ({}), using defaults", e);
                SystemConfig::default()
            }
        }
    }

    pub fn save_config(&self, config: &SystemConfig) -> Result<(), StorageError> {
        config.validate().map_err(|msg| {
            warn!("NvsAdapter: refusing to save invalid config: {}", msg);
            StorageError::IoError
        })?;
        let bytes = postcard::to_allocvec(config).map_err(|_| StorageError::IoError)?;
        self.write_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)?;
        info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
        Ok(())
    }

    // ── WiFi credentials ─────────────────────────────────────

    /// Load stored station credentials.  `Ok(None)` means never provisioned.
    pub fn load_credentials(&self) -> Result<Option<WifiCredentials>, StorageError> {
        let ssid_bytes = match self.read_blob(WIFI_NAMESPACE, SSID_KEY) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        let password_bytes = match self.read_blob(WIFI_NAMESPACE, PASSWORD_KEY) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        let ssid = str_from_blob::<MAX_SSID_LEN>(&ssid_bytes)?;
        let password = str_from_blob::<MAX_PASSWORD_LEN>(&password_bytes)?;
        if ssid.is_empty() {
            return Ok(None);
        }
        Ok(Some(WifiCredentials { ssid, password }))
    }

    pub fn store_credentials(&self, creds: &WifiCredentials) -> Result<(), StorageError> {
        self.write_blob(WIFI_NAMESPACE, SSID_KEY, creds.ssid.as_bytes())?;
        self.write_blob(WIFI_NAMESPACE, PASSWORD_KEY, creds.password.as_bytes())?;
        info!("NvsAdapter: credentials stored (ssid '{}')", creds.ssid);
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        matches!(self.load_credentials(), Ok(Some(_)))
    }

    /// Factory reset: wipe the whole `wifi` namespace.
    pub fn clear_credentials(&self) -> Result<(), StorageError> {
        self.erase_namespace(WIFI_NAMESPACE)?;
        info!("NvsAdapter: credentials erased");
        Ok(())
    }
}

fn str_from_blob<const N: usize>(bytes: &[u8]) -> Result<heapless::String<N>, StorageError> {
    let s = core::str::from_utf8(bytes).map_err(|_| StorageError::Corrupted)?;
    heapless::String::try_from(s).map_err(|_| StorageError::Corrupted)
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

    #[test]
    fn credentials_round_trip() {
        let nvs = NvsAdapter::new().unwrap();
        assert!(!nvs.has_credentials());

        nvs.store_credentials(&creds("barnyard", "hunter2hunter2"))
            .unwrap();
        let loaded = nvs.load_credentials().unwrap().unwrap();
        assert_eq!(loaded.ssid.as_str(), "barnyard");
        assert_eq!(loaded.password.as_str(), "hunter2hunter2");
    }

    #[test]
    fn clear_removes_credentials() {
        let nvs = NvsAdapter::new().unwrap();
        nvs.store_credentials(&creds("barnyard", "pw")).unwrap();
        nvs.clear_credentials().unwrap();
        assert!(nvs.load_credentials().unwrap().is_none());
    }

    #[test]
    fn empty_ssid_treated_as_unprovisioned() {
        let nvs = NvsAdapter::new().unwrap();
        nvs.store_credentials(&creds("", "pw")).unwrap();
        assert!(nvs.load_credentials().unwrap().is_none());
    }

    #[test]
    fn config_round_trip() {
        let nvs = NvsAdapter::new().unwrap();
        let mut cfg = SystemConfig::default();
        cfg.cleaning_cooldown_secs = 120;
        nvs.save_config(&cfg).unwrap();
        assert_eq!(nvs.load_config(), cfg);
    }

    #[test]
    fn missing_config_yields_defaults() {
        let nvs = NvsAdapter::new().unwrap();
        assert_eq!(nvs.load_config(), SystemConfig::default());
    }

    #[test]
    fn invalid_config_refused_on_save() {
        let nvs = NvsAdapter::new().unwrap();
        let cfg = SystemConfig {
            step_pulse_width_us: 0,
            ..Default::default()
        };
        assert!(nvs.save_config(&cfg).is_err());
    }
}
