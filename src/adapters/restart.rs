//! Device restart after a committed update.
//!
//! - **`target_os = "espidf"`**: `esp_ota::restart()`, never returns.
//! - **`not(target_os = "espidf")`**: counts the request and returns, so a
//!   simulated agent keeps polling.

use log::info;

use crate::app::ports::RestartPort;

#[derive(Debug, Default)]
pub struct DeviceRestart {
    #[cfg(not(target_os = "espidf"))]
    requests: u32,
}

impl DeviceRestart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart requests seen so far (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn requests(&self) -> u32 {
        self.requests
    }
}

#[cfg(target_os = "espidf")]
impl RestartPort for DeviceRestart {
    fn restart(&mut self) {
        info!("OTA: rebooting into new firmware");
        esp_ota::restart();
    }
}

#[cfg(not(target_os = "espidf"))]
impl RestartPort for DeviceRestart {
    fn restart(&mut self) {
        self.requests += 1;
        info!("OTA: restart requested (simulation, #{})", self.requests);
    }
}
