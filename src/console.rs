//! Local diagnostic console on the log UART.
//!
//! Two single-key commands, polled between step pulses so they never get
//! in the way of motion timing:
//!
//! - `r` — factory reset: queue a credential wipe and restart.
//! - `e` — encoder self-test readout.

use log::{info, warn};

use crate::config::SystemConfig;
use crate::drivers::motion::MotionSystem;
use crate::events::{self, Event};

#[cfg(target_os = "espidf")]
const UART_RX_BUF_BYTES: i32 = 256;

/// Install the UART driver so the console can read.  Logging keeps going
/// through the same port untouched.
#[cfg(target_os = "espidf")]
pub fn init() {
    use esp_idf_svc::sys::*;
    let ret = unsafe {
        uart_driver_install(
            UART_NUM_0 as i32,
            UART_RX_BUF_BYTES,
            0,
            0,
            core::ptr::null_mut(),
            0,
        )
    };
    if ret != ESP_OK {
        warn!("console: UART driver install failed ({}), console disabled", ret);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn init() {}

#[cfg(target_os = "espidf")]
fn read_byte() -> Option<u8> {
    use esp_idf_svc::sys::*;
    let mut byte = 0u8;
    let n = unsafe {
        uart_read_bytes(
            UART_NUM_0 as i32,
            core::ptr::addr_of_mut!(byte).cast(),
            1,
            0,
        )
    };
    (n == 1).then_some(byte)
}

#[cfg(not(target_os = "espidf"))]
fn read_byte() -> Option<u8> {
    None
}

/// Dispatch one keystroke.  Returns `true` when the byte was a command.
pub fn handle_command(byte: u8, motion: &MotionSystem, config: &SystemConfig) -> bool {
    match byte {
        b'r' | b'R' => {
            warn!("console: factory reset requested");
            events::push_event(Event::FactoryReset);
            true
        }
        b'e' | b'E' => {
            info!(
                "console: encoder position={} angle={:.2}deg homed={} moving={}",
                motion.encoder_position(),
                motion.angle_degrees(config),
                motion.tilt_homed(),
                motion.tilt_moving()
            );
            true
        }
        b'\r' | b'\n' | b' ' => false,
        other => {
            info!(
                "console: unknown command {:?} (r = factory reset, e = encoder test)",
                other as char
            );
            false
        }
    }
}

/// Drain any pending keystrokes.  Called opportunistically from the pulse
/// loop; must never block.
pub fn poll(motion: &MotionSystem, config: &SystemConfig) {
    while let Some(byte) = read_byte() {
        handle_command(byte, motion, config);
    }
}
