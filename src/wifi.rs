//! WiFi module for the camera board
//!
//! Handles station association using esp-wifi 0.14.1 with embassy-net DHCP,
//! falling back to a soft-AP when the configured network cannot be joined.

use crate::{CamError, config};
use embassy_net::Stack;
use esp_println::println;
use esp_wifi::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, WifiController,
};

/// How the board is reachable on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// Joined the configured network, addressed via DHCP
    Station,
    /// Standalone soft-AP fallback at a fixed address
    AccessPoint,
}

/// WiFi manager for handling network connectivity
pub struct WiFiManager<'a> {
    controller: WifiController<'a>,
    is_connected: bool,
    mode: NetworkMode,
    stack: Option<Stack<'a>>, // Embassy-net stack for DHCP lookups
}

impl<'a> WiFiManager<'a> {
    /// Create a new WiFi manager instance
    pub fn new(controller: WifiController<'a>) -> Self {
        Self {
            controller,
            is_connected: false,
            mode: NetworkMode::Station,
            stack: None,
        }
    }

    /// Set the embassy-net stack used for address lookups
    pub fn set_stack(&mut self, stack: Stack<'a>) {
        self.stack = Some(stack);
    }

    /// Connect to the configured WiFi network as a station
    pub fn connect(&mut self, ssid: &str, password: &str) -> Result<(), CamError> {
        println!("[WIFI] Connecting to WiFi network: {}", ssid);

        let client_config = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| CamError::WiFiError)?,
            password: password.try_into().map_err(|_| CamError::WiFiError)?,
            auth_method: AuthMethod::WPA2Personal,
            ..Default::default()
        };

        self.controller
            .set_configuration(&Configuration::Client(client_config))
            .map_err(|_| CamError::WiFiError)?;

        self.controller.start().map_err(|_| CamError::WiFiError)?;
        self.controller.connect().map_err(|_| CamError::WiFiError)?;

        // Wait for association
        let mut attempts = 0;
        while !self.controller.is_connected().unwrap_or(false)
            && attempts < config::WIFI_CONNECT_ATTEMPTS
        {
            attempts += 1;
            // Simple delay
            for _ in 0..100000 {
                core::hint::spin_loop();
            }
        }

        if self.controller.is_connected().unwrap_or(false) {
            self.is_connected = true;
            self.mode = NetworkMode::Station;
            println!("[WIFI] Successfully connected to WiFi network");
            Ok(())
        } else {
            println!(
                "[WIFI] Failed to connect to WiFi network after {} attempts",
                attempts
            );
            Err(CamError::WiFiError)
        }
    }

    /// Bring up the standalone soft-AP. Used when station association fails
    /// so the camera stays reachable at a fixed address.
    pub fn start_access_point(&mut self) -> Result<(), CamError> {
        println!("[WIFI] Starting fallback access point: {}", config::AP_SSID);

        let _ = self.controller.stop();

        let ap_config = AccessPointConfiguration {
            ssid: config::AP_SSID.try_into().map_err(|_| CamError::WiFiError)?,
            password: config::AP_PASSWORD
                .try_into()
                .map_err(|_| CamError::WiFiError)?,
            auth_method: AuthMethod::WPA2Personal,
            channel: 1,
            ..Default::default()
        };

        self.controller
            .set_configuration(&Configuration::AccessPoint(ap_config))
            .map_err(|_| CamError::WiFiError)?;
        self.controller.start().map_err(|_| CamError::WiFiError)?;

        self.is_connected = true;
        self.mode = NetworkMode::AccessPoint;
        println!("[WIFI] Access point up, join {} and browse to 192.168.4.1", config::AP_SSID);
        Ok(())
    }

    /// Current network mode
    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    /// Get the current IPv4 address (DHCP lease or the fixed AP address)
    pub fn get_ip_address(&self) -> Option<[u8; 4]> {
        if !self.is_connected {
            return None;
        }

        if let Some(ref stack) = self.stack {
            if let Some(cfg) = stack.config_v4() {
                return Some(cfg.address.address().octets());
            }
            println!("[WIFI] IPv4 configuration not yet available");
        } else {
            println!("[WIFI] Embassy-net stack not set - cannot get IP address");
        }

        None
    }

    /// Check if WiFi is connected (always true once the AP is up)
    pub fn is_connected(&self) -> bool {
        match self.mode {
            NetworkMode::Station => {
                self.is_connected && self.controller.is_connected().unwrap_or(false)
            }
            NetworkMode::AccessPoint => self.is_connected,
        }
    }

    /// Monitor WiFi connection status. Meaningful in station mode only;
    /// the soft-AP has no upstream link to lose.
    pub fn monitor_connection(&mut self) -> Result<(), CamError> {
        if self.mode == NetworkMode::AccessPoint {
            return Ok(());
        }

        let current_status = self.controller.is_connected().unwrap_or(false);

        if self.is_connected && !current_status {
            println!("[WIFI] WiFi connection lost!");
            self.is_connected = false;
        } else if !self.is_connected && current_status {
            println!("[WIFI] WiFi connection restored!");
            self.is_connected = true;
        }

        Ok(())
    }
}
