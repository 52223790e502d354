//! Status LED pattern engine.
//!
//! Three visual signals: triple blink while waiting for the location sync,
//! a slow pulse during normal tracking, and a fast blink under manual
//! override.  The control task picks the pattern and calls
//! [`StatusLed::update`] with a millisecond timestamp each pass; patterns
//! are pure functions of time so `update` never blocks.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::drivers::hw_init;
use crate::pins;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedPattern {
    Off,
    /// Triple 50 ms blink each second — waiting for location sync.
    Waiting,
    /// 1 s on / 1 s off — tracking normally.
    Tracking,
    /// 100 ms toggle — manual override active.
    Manual,
}

impl LedPattern {
    fn as_u8(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Waiting => 1,
            Self::Tracking => 2,
            Self::Manual => 3,
        }
    }

    fn lit_at(self, now_ms: u64) -> bool {
        match self {
            Self::Off => false,
            Self::Waiting => {
                let phase = now_ms % 1_000;
                // Three 50 ms flashes at 100 ms spacing, then dark.
                matches!(phase, 0..=49 | 100..=149 | 200..=249)
            }
            Self::Tracking => (now_ms / 1_000) % 2 == 0,
            Self::Manual => (now_ms / 100) % 2 == 0,
        }
    }
}

pub struct StatusLed {
    pattern: AtomicU8,
    lit: AtomicBool,
}

impl StatusLed {
    pub const fn new() -> Self {
        Self {
            pattern: AtomicU8::new(0),
            lit: AtomicBool::new(false),
        }
    }

    pub fn set_pattern(&self, pattern: LedPattern) {
        self.pattern.store(pattern.as_u8(), Ordering::Relaxed);
        if pattern == LedPattern::Off {
            self.write(false);
        }
    }

    pub fn pattern(&self) -> LedPattern {
        match self.pattern.load(Ordering::Relaxed) {
            1 => LedPattern::Waiting,
            2 => LedPattern::Tracking,
            3 => LedPattern::Manual,
            _ => LedPattern::Off,
        }
    }

    /// Advance the blink phase for the current time.
    pub fn update(&self, now_ms: u64) {
        let lit = self.pattern().lit_at(now_ms);
        if lit != self.lit.load(Ordering::Relaxed) {
            self.write(lit);
        }
    }

    fn write(&self, lit: bool) {
        self.lit.store(lit, Ordering::Relaxed);
        hw_init::gpio_write(pins::STATUS_LED_GPIO, lit);
    }

    #[cfg(test)]
    fn lit(&self) -> bool {
        self.lit.load(Ordering::Relaxed)
    }
}

impl Default for StatusLed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_is_a_triple_blink() {
        let led = StatusLed::new();
        led.set_pattern(LedPattern::Waiting);
        led.update(10);
        assert!(led.lit());
        led.update(60);
        assert!(!led.lit());
        led.update(110);
        assert!(led.lit());
        led.update(210);
        assert!(led.lit());
        // Rest of the second stays dark.
        led.update(500);
        assert!(!led.lit());
        led.update(900);
        assert!(!led.lit());
    }

    #[test]
    fn tracking_pulses_slowly() {
        let led = StatusLed::new();
        led.set_pattern(LedPattern::Tracking);
        led.update(0);
        assert!(led.lit());
        led.update(1_500);
        assert!(!led.lit());
        led.update(2_100);
        assert!(led.lit());
    }

    #[test]
    fn manual_blinks_fast() {
        let led = StatusLed::new();
        led.set_pattern(LedPattern::Manual);
        led.update(0);
        assert!(led.lit());
        led.update(150);
        assert!(!led.lit());
        led.update(200);
        assert!(led.lit());
    }

    #[test]
    fn off_forces_dark() {
        let led = StatusLed::new();
        led.set_pattern(LedPattern::Tracking);
        led.update(0);
        assert!(led.lit());
        led.set_pattern(LedPattern::Off);
        assert!(!led.lit());
        led.update(0);
        assert!(!led.lit());
    }
}
