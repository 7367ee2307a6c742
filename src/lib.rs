#![no_std]

//! ESP32-S3 Camera Firmware Library
//!
//! This library provides modules for a WiFi-enabled camera module that serves
//! MJPEG video, snapshots and telemetry over HTTP and drives an illumination
//! LED from a photoresistor reading.

extern crate alloc;

pub mod camera;
pub mod flash;
pub mod http_server;
pub mod light_sensor;
pub mod state_machine;
pub mod wifi;

/// Project version information
pub const VERSION: &str = "0.1.0-dev";

/// Default configuration constants
pub mod config {
    /// HTTP server port
    pub const HTTP_PORT: u16 = 80;

    /// Flash LED GPIO pin (documentation only, the pin is bound in main)
    pub const FLASH_PIN: u8 = 21;

    /// Light sensor ADC GPIO pin (documentation only)
    pub const LIGHT_SENSOR_PIN: u8 = 2;

    /// ADC level below which the flash turns on in auto mode (0..=4095)
    pub const LIGHT_THRESHOLD: u16 = 500;

    /// Interval between light samples and flash re-evaluations
    pub const LIGHT_CHECK_INTERVAL_MS: u64 = 2000;

    /// Delay between streamed frames (~20 fps)
    pub const STREAM_FRAME_DELAY_MS: u64 = 50;

    /// OV2640 SCCB address
    pub const CAMERA_I2C_ADDR: u8 = 0x30;

    /// OV2640 JPEG compression level (higher = smaller frames)
    pub const CAMERA_JPEG_QUALITY: u8 = 12;

    /// Frame buffer size for one JPEG VGA frame
    pub const FRAME_BUFFER_SIZE: usize = 32 * 1024;

    /// WiFi configuration
    /// Read from environment variables at compile time
    pub const WIFI_SSID: &str = env!("WIFI_SSID");
    pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

    /// Soft-AP fallback credentials, used when station association fails
    pub const AP_SSID: &str = "cam-rs-setup";
    pub const AP_PASSWORD: &str = "12345678";

    /// WiFi connection attempts before falling back to AP mode
    pub const WIFI_CONNECT_ATTEMPTS: u32 = 50;
}

/// Error types for the camera firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CamError {
    /// WiFi connection error
    WiFiError,
    /// Camera init or capture error
    CameraError,
}
