//! Loop pacing.
//!
//! The agent waits through [`embedded_hal::delay::DelayNs`].
//!
//! - **`target_os = "espidf"`**: `esp_idf_hal::delay::FreeRtos`, which
//!   yields the task via `vTaskDelay` so the rest of the firmware keeps
//!   running while the agent backs off.
//! - **`not(target_os = "espidf")`**: [`StdDelay`], a `thread::sleep`
//!   wrapper for host-side simulation.

use embedded_hal::delay::DelayNs;

/// Blocking delay backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
