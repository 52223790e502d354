//! One-shot hardware peripheral initialization and raw register helpers.
//!
//! Configures ADC channels, GPIO directions, and LEDC timers/channels using
//! raw ESP-IDF sys calls.  Called once from `main()` before the provisioning
//! machine starts.
//!
//! On non-espidf targets the helpers operate on an in-memory pin/duty map so
//! driver logic (homing edges, H-bridge exclusion) is testable on the host.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use crate::pins;

#[cfg(target_os = "espidf")]
use log::info;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    GpioConfigFailed(i32),
    LedcInitFailed,
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::LedcInitFailed => write!(f, "LEDC timer/channel config failed"),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

// ── Simulation backing state (host targets) ──────────────────
//
// Inputs default HIGH (every input here idles high through a pull-up:
// the limit switch, IR sensors, and encoder B are all active LOW).

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub static GPIO_LEVELS: Mutex<Option<HashMap<i32, bool>>> = Mutex::new(None);
    pub static LEDC_DUTIES: Mutex<[u8; 8]> = Mutex::new([0; 8]);
    pub static ADC_RAW: Mutex<u16> = Mutex::new(0);
}

/// Serialise tests that touch process-global simulation state (pin map,
/// LEDC duties, encoder position, event queue).  One lock for all of it,
/// so tests in different modules cannot interleave.
#[cfg(not(target_os = "espidf"))]
pub fn sim_exclusive() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Force a simulated input level (host test hook).
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_gpio(pin: i32, high: bool) {
    let mut map = sim::GPIO_LEVELS.lock().unwrap();
    map.get_or_insert_with(Default::default).insert(pin, high);
}

/// Current simulated duty on an LEDC channel (host test hook).
#[cfg(not(target_os = "espidf"))]
pub fn sim_ledc_duty(channel: u32) -> u8 {
    sim::LEDC_DUTIES.lock().unwrap()[channel as usize]
}

/// Force the simulated ADC raw reading (host test hook).
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_adc_raw(raw: u16) {
    *sim::ADC_RAW.lock().unwrap() = raw;
}

// ── Peripheral init ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: called once from main() before any task starts; single-threaded.
    unsafe {
        init_adc()?;
        init_gpio_inputs()?;
        init_gpio_outputs()?;
        init_ledc();
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── ADC (oneshot) ─────────────────────────────────────────────

#[cfg(target_os = "espidf")]
static mut ADC1_HANDLE: adc_oneshot_unit_handle_t = core::ptr::null_mut();

/// SAFETY: written once in `init_adc()` before the control task starts;
/// afterwards only read from the control task's sampling path.
#[cfg(target_os = "espidf")]
unsafe fn adc1_handle() -> adc_oneshot_unit_handle_t {
    unsafe { ADC1_HANDLE }
}

#[cfg(target_os = "espidf")]
unsafe fn init_adc() -> Result<(), HwInitError> {
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    // SAFETY: ADC1_HANDLE is only written here, once at boot.
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &raw mut ADC1_HANDLE) };
    if ret != ESP_OK {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    let ret =
        unsafe { adc_oneshot_config_channel(adc1_handle(), pins::ADC1_CH_CURRENT, &chan_cfg) };
    if ret != ESP_OK {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    info!("hw_init: ADC1 configured (CH{}=current sense)", pins::ADC1_CH_CURRENT);
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn adc1_read(channel: u32) -> u16 {
    let mut raw: i32 = 0;
    // SAFETY: adc1_handle() contract — sampling path only, after init.
    let ret = unsafe { adc_oneshot_read(adc1_handle(), channel, &mut raw) };
    if ret != ESP_OK {
        return 0;
    }
    raw.max(0) as u16
}

#[cfg(not(target_os = "espidf"))]
pub fn adc1_read(_channel: u32) -> u16 {
    *sim::ADC_RAW.lock().unwrap()
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    // Pull-ups everywhere: open-collector encoder outputs and the
    // limit switch both need them; IR modules tolerate them.
    let input_pins = [
        pins::ENCODER_A_GPIO,
        pins::ENCODER_B_GPIO,
        pins::LIMIT_GPIO,
        pins::IR_1_GPIO,
        pins::IR_2_GPIO,
    ];

    for &pin in &input_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }

    info!("hw_init: GPIO inputs configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access on an
    // already-configured input pin; safe from any context including ISRs.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(pin: i32) -> bool {
    sim::GPIO_LEVELS
        .lock()
        .unwrap()
        .as_ref()
        .and_then(|m| m.get(&pin).copied())
        .unwrap_or(true)
}

// ── GPIO Outputs ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_outputs() -> Result<(), HwInitError> {
    let output_pins = [
        pins::TILT_ENA_GPIO,
        pins::TILT_STEP_GPIO,
        pins::TILT_DIR_GPIO,
        pins::STATUS_LED_GPIO,
    ];

    for &pin in &output_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
        unsafe { gpio_set_level(pin, 0) };
    }

    // Enable line is active LOW — park the driver disabled.
    unsafe { gpio_set_level(pins::TILT_ENA_GPIO, 1) };

    info!("hw_init: GPIO outputs configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: writes to an already-configured output pin.
    unsafe {
        gpio_set_level(pin, u32::from(high));
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(pin: i32, high: bool) {
    let mut map = sim::GPIO_LEVELS.lock().unwrap();
    map.get_or_insert_with(Default::default).insert(pin, high);
}

// ── LEDC PWM ─────────────────────────────────────────────────

/// LEDC channel driving the cleaning H-bridge right (forward) input.
pub const LEDC_CH_CLEAN_R: u32 = 0;
/// LEDC channel driving the cleaning H-bridge left (reverse) input.
pub const LEDC_CH_CLEAN_L: u32 = 1;

#[cfg(target_os = "espidf")]
unsafe fn init_ledc() {
    // SAFETY: called from the single boot context via init_peripherals().
    let timer0 = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        freq_hz: pins::CLEAN_PWM_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    unsafe {
        ledc_timer_config(&timer0);
    }

    let clean_channels = [
        (LEDC_CH_CLEAN_R, pins::CLEAN_R_GPIO),
        (LEDC_CH_CLEAN_L, pins::CLEAN_L_GPIO),
    ];
    for &(channel, gpio) in &clean_channels {
        unsafe {
            ledc_channel_config(&ledc_channel_config_t {
                speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                channel,
                timer_sel: ledc_timer_t_LEDC_TIMER_0,
                gpio_num: gpio,
                duty: 0,
                hpoint: 0,
                ..Default::default()
            });
        }
    }

    info!("hw_init: LEDC configured (clean R=CH0, clean L=CH1)");
}

#[cfg(target_os = "espidf")]
pub fn ledc_set(channel: u32, duty: u8) {
    // SAFETY: channels were configured in init_ledc(); duty register writes
    // are serialised by the single commanding task.
    unsafe {
        ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, duty as u32);
        ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(channel: u32, duty: u8) {
    sim::LEDC_DUTIES.lock().unwrap()[channel as usize] = duty;
}

// ── Microsecond delay (step-pulse hold) ──────────────────────

#[cfg(target_os = "espidf")]
pub fn delay_us(us: u32) {
    // SAFETY: busy-wait rotation; does not yield, which is exactly what the
    // pulse loop needs.
    unsafe {
        esp_rom_delay_us(us);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn delay_us(us: u32) {
    let start = std::time::Instant::now();
    while start.elapsed().as_micros() < u128::from(us) {
        std::hint::spin_loop();
    }
}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn encoder_gpio_isr(_arg: *mut core::ffi::c_void) {
    crate::drivers::encoder::encoder_isr_handler();
}

/// Install the GPIO ISR service and register the encoder edge handler.
/// Call after [`init_peripherals`] and before the pulse loop.
#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed (acceptable). The registered handler
    // performs two pin reads and one atomic update, nothing more.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        gpio_set_intr_type(pins::ENCODER_A_GPIO, gpio_int_type_t_GPIO_INTR_POSEDGE);
        gpio_isr_handler_add(
            pins::ENCODER_A_GPIO,
            Some(encoder_gpio_isr),
            core::ptr::null_mut(),
        );
        gpio_intr_enable(pins::ENCODER_A_GPIO);

        info!("hw_init: ISR service installed (encoder A rising edge)");
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}
