//! Flash LED control module
//!
//! Holds the illumination mode (auto / forced on / forced off) and drives the
//! flash output pin, either directly on a manual override or from the light
//! sensor reading on each sensing tick.

use crate::config;
use esp_hal::gpio::Output;
use esp_println::println;

/// Illumination policy for the flash LED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMode {
    /// Sensor-driven: on when the ambient light drops below the threshold
    Auto,
    /// Manually forced on, sensor ignored
    ForcedOn,
    /// Manually forced off, sensor ignored
    ForcedOff,
}

impl FlashMode {
    /// Parse a `/flash?action=` value. Anything outside {on, off, auto}
    /// is rejected.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "on" => Some(FlashMode::ForcedOn),
            "off" => Some(FlashMode::ForcedOff),
            "auto" => Some(FlashMode::Auto),
            _ => None,
        }
    }

    /// Mode label used by the status endpoint. The MANUEL spelling is kept
    /// for compatibility with existing clients.
    pub fn status_label(&self) -> &'static str {
        match self {
            FlashMode::Auto => "AUTO",
            FlashMode::ForcedOn | FlashMode::ForcedOff => "MANUEL",
        }
    }
}

/// Decide the flash output for a mode and light sample.
///
/// Pure function: auto mode turns the flash on strictly below the threshold.
/// There is no hysteresis, so a light level oscillating around the threshold
/// toggles the output on every tick.
pub fn flash_demand(mode: FlashMode, level: u16) -> bool {
    match mode {
        FlashMode::Auto => level < config::LIGHT_THRESHOLD,
        FlashMode::ForcedOn => true,
        FlashMode::ForcedOff => false,
    }
}

/// Flash controller owning the output pin and the shared illumination state
pub struct FlashController {
    pin: Output<'static>,
    mode: FlashMode,
    last_level: u16,
}

impl FlashController {
    /// Create a new controller. The pin is expected to start low.
    pub fn new(pin: Output<'static>) -> Self {
        Self {
            pin,
            mode: FlashMode::Auto,
            last_level: 0,
        }
    }

    /// Change the illumination mode. Forced modes drive the pin immediately
    /// instead of waiting for the next sensing tick.
    pub fn set_mode(&mut self, mode: FlashMode) {
        self.mode = mode;
        match mode {
            FlashMode::ForcedOn => {
                self.pin.set_high();
                println!("[FLASH] Flash forced on");
            }
            FlashMode::ForcedOff => {
                self.pin.set_low();
                println!("[FLASH] Flash forced off");
            }
            FlashMode::Auto => {
                println!("[FLASH] Auto mode enabled");
            }
        }
    }

    /// Record a light sample and re-apply the policy. Called once per
    /// sensing interval.
    pub fn tick(&mut self, level: u16) {
        self.last_level = level;
        if flash_demand(self.mode, level) {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }

    pub fn mode(&self) -> FlashMode {
        self.mode
    }

    /// Current level of the physical output pin
    pub fn is_on(&self) -> bool {
        self.pin.is_set_high()
    }

    /// Most recent light sample (0 until the first tick)
    pub fn light_level(&self) -> u16 {
        self.last_level
    }
}
