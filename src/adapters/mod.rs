//! Platform adapters: persistence, radios, and time.
//!
//! Every adapter is cfg-gated: real ESP-IDF calls on `target_os = "espidf"`,
//! a simulation backend everywhere else so the logic above this layer runs
//! in host tests.

pub mod ble;
pub mod nvs;
pub mod time;
pub mod wifi;
