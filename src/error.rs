//! Unified error types for the Heliotrack firmware.
//!
//! A single `Error` enum every subsystem converts into, keeping error
//! handling at the task level uniform.  All variants are `Copy` so they can
//! be passed through the control paths without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A pairing-channel or credential operation failed.
    Provisioning(ProvisioningError),
    /// A connectivity operation failed.
    Comms(CommsError),
    /// Persistent storage failed.
    Storage(StorageError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisioning(e) => write!(f, "provisioning: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Provisioning errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningError {
    /// BLE stack initialisation failed.
    StackInitFailed,
    /// A characteristic write exceeds its slot length.
    DataTooLong,
    /// A characteristic write contains invalid UTF-8.
    InvalidUtf8,
    /// Network identity rejected (1-32 printable ASCII bytes).
    InvalidIdentity,
    /// Network secret rejected (8-64 bytes).
    InvalidSecret,
    /// Status publish with no peer attached.
    NoPeerAttached,
}

impl fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackInitFailed => write!(f, "BLE stack initialisation failed"),
            Self::DataTooLong => write!(f, "write exceeds max slot length"),
            Self::InvalidUtf8 => write!(f, "write contains invalid UTF-8"),
            Self::InvalidIdentity => write!(f, "identity invalid (1-32 printable ASCII bytes)"),
            Self::InvalidSecret => write!(f, "secret invalid (8-64 bytes)"),
            Self::NoPeerAttached => write!(f, "no peer attached"),
        }
    }
}

impl From<ProvisioningError> for Error {
    fn from(e: ProvisioningError) -> Self {
        Self::Provisioning(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    /// Association attempt exhausted its retry budget.
    WifiConnectFailed,
    /// No credentials configured.
    NoCredentials,
    /// SNTP refresh failed.
    TimeSyncFailed,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WifiConnectFailed => write!(f, "WiFi connect failed"),
            Self::NoCredentials => write!(f, "no credentials configured"),
            Self::TimeSyncFailed => write!(f, "time sync failed"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored blob failed deserialisation.
    Corrupted,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored blob corrupted"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
