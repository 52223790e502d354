//! GPIO / peripheral pin assignments for the Heliotrack main board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.
//!
//! Assignments follow the rev-B harness; they are board wiring, not a
//! protocol contract.

// ---------------------------------------------------------------------------
// Cleaning motor driver (IBT-2 dual half-bridge)
// ---------------------------------------------------------------------------

/// LEDC PWM output driving the right (forward) half-bridge.
pub const CLEAN_R_GPIO: i32 = 32;
/// LEDC PWM output driving the left (reverse) half-bridge.
pub const CLEAN_L_GPIO: i32 = 33;

// ---------------------------------------------------------------------------
// Tilt motor (stepper driver, step/dir/enable)
// ---------------------------------------------------------------------------

/// Driver enable line (active LOW — LOW = output stage energised).
pub const TILT_ENA_GPIO: i32 = 21;
/// Step pulse line (PUL+).
pub const TILT_STEP_GPIO: i32 = 22;
/// Direction line (DIR+).
pub const TILT_DIR_GPIO: i32 = 23;

// ---------------------------------------------------------------------------
// Tilt shaft encoder (quadrature, open-collector — input pull-ups required)
// ---------------------------------------------------------------------------

/// Encoder channel A (interrupt on rising edge).
pub const ENCODER_A_GPIO: i32 = 18;
/// Encoder channel B (read synchronously inside the A-edge ISR).
pub const ENCODER_B_GPIO: i32 = 19;

// ---------------------------------------------------------------------------
// Homing limit switch (active LOW with pull-up; sampled per actuation tick)
// ---------------------------------------------------------------------------

pub const LIMIT_GPIO: i32 = 15;

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// Panel current sense — analog input on ADC1.
pub const CURRENT_ADC_GPIO: i32 = 34;
/// IR proximity sensor 1 (active LOW on reflection).
pub const IR_1_GPIO: i32 = 13;
/// IR proximity sensor 2 (active LOW on reflection).
pub const IR_2_GPIO: i32 = 14;

// ---------------------------------------------------------------------------
// Status LED
// ---------------------------------------------------------------------------

pub const STATUS_LED_GPIO: i32 = 2;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  8-bit gives 0 – 255 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// LEDC base frequency for the cleaning motor H-bridge (5 kHz).
pub const CLEAN_PWM_FREQ_HZ: u32 = 5_000;

/// ADC1 channel for the current-sense input (GPIO 34 on ESP32).
pub const ADC1_CH_CURRENT: u32 = 6;
