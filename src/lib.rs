//! Heliotrack firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod api;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod maintenance;
pub mod pins;
pub mod provisioning;
pub mod solar;
pub mod state;
pub mod tasks;

pub mod adapters;
pub mod drivers;
pub mod sensors;
