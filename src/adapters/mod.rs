//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements    | Connects to (device / host)                 |
//! |------------|---------------|---------------------------------------------|
//! | `nvs`      | StoragePort   | ESP-IDF NVS / in-memory typed map           |
//! | `http`     | HttpPort      | `EspHttpConnection` + CA bundle / `reqwest`  |
//! | `ota`      | InstallPort   | `esp_ota::OtaUpdate` / file-backed slot      |
//! | `entropy`  | EntropyPort   | `esp_fill_random` / `OsRng`                  |
//! | `restart`  | RestartPort   | `esp_ota::restart` / request counter         |
//! | `time`     | DelayNs       | FreeRTOS `vTaskDelay` / `thread::sleep`      |

pub mod entropy;
pub mod http;
pub mod nvs;
pub mod ota;
pub mod restart;
pub mod time;

#[cfg(all(test, not(target_os = "espidf")))]
pub(crate) mod test_server;
