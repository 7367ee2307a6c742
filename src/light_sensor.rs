//! Photoresistor reader
//!
//! Wraps a single one-shot ADC conversion into a light-level sample. No
//! averaging or filtering; the sensing task calls this once per interval.

use esp_hal::analog::adc::{Adc, AdcPin};
use esp_hal::peripherals::{ADC1, GPIO2};
use esp_println::println;

/// ADC bound to the photoresistor pin
pub type LightAdc = Adc<'static, ADC1<'static>, esp_hal::Blocking>;
/// Photoresistor ADC channel (GPIO2 on the XIAO ESP32-S3)
pub type LightAdcPin = AdcPin<GPIO2<'static>, ADC1<'static>>;

/// One-shot reader for the ambient light sensor
pub struct LightSensor {
    adc: LightAdc,
    pin: LightAdcPin,
    last_sample: u16,
}

impl LightSensor {
    pub fn new(adc: LightAdc, pin: LightAdcPin) -> Self {
        Self {
            adc,
            pin,
            last_sample: 0,
        }
    }

    /// Read the analog input once. A conversion that is not ready yet (or
    /// fails) returns the previous sample rather than an error; the policy
    /// re-evaluates on the next tick anyway.
    pub fn sample(&mut self) -> u16 {
        match self.adc.read_oneshot(&mut self.pin) {
            Ok(raw) => {
                self.last_sample = raw;
                raw
            }
            Err(_) => {
                println!("[SENSE] ADC conversion not ready, keeping {}", self.last_sample);
                self.last_sample
            }
        }
    }
}
