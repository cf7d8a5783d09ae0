//! Random bytes for minting device identities.
//!
//! - **`target_os = "espidf"`**: hardware RNG via `esp_fill_random`. Only
//!   cryptographically strong with the RF subsystem (WiFi/BT) enabled or
//!   the bootloader entropy source active.
//! - **`not(target_os = "espidf")`**: the operating system CSPRNG
//!   (`rand::rngs::OsRng`).

use crate::app::ports::EntropyPort;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEntropy;

#[cfg(target_os = "espidf")]
impl EntropyPort for SystemEntropy {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        // SAFETY: esp_fill_random writes exactly `len` bytes into the
        // provided buffer, which is valid and exclusively borrowed.
        unsafe {
            esp_idf_svc::sys::esp_fill_random(buf.as_mut_ptr().cast(), buf.len());
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl EntropyPort for SystemEntropy {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(buf);
    }
}
