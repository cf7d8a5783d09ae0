//! Agent configuration parameters
//!
//! Everything the embedding firmware can tune about the update agent.
//! Values can be built in code, or provisioned as JSON and deserialised.
//! [`AgentConfig::validate`] runs before the loop starts; an invalid config
//! never reaches the network.

use serde::{Deserialize, Serialize};

use crate::app::types::{FirmwareId, ServerUrl};
use crate::error::ConfigError;

pub const DEFAULT_SERVER_URL: &str = "https://ota.example/";

/// Largest exponent the backoff calculator accepts.
pub const MAX_BACKOFF_EXPONENT: u32 = 16;

const MAX_TOKEN_LEN: usize = 64;

/// How the device proves its identity on check and download requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthScheme {
    /// `x-ota-device-id` + `x-ota-device-key`, both hex.
    #[default]
    HeaderPair,
    /// A single opaque `x-ota-device` token issued to the firmware.
    DeviceToken { token: heapless::String<MAX_TOKEN_LEN> },
}

impl AuthScheme {
    /// Token scheme from a string, validated.
    pub fn token(token: &str) -> Result<Self, ConfigError> {
        let mut t = heapless::String::new();
        t.push_str(token).map_err(|()| ConfigError::InvalidToken)?;
        let scheme = Self::DeviceToken { token: t };
        scheme.validate()?;
        Ok(scheme)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::HeaderPair => Ok(()),
            Self::DeviceToken { token } => {
                let printable = token.bytes().all(|b| (0x21..=0x7E).contains(&b));
                if token.is_empty() || !printable {
                    return Err(ConfigError::InvalidToken);
                }
                Ok(())
            }
        }
    }
}

/// Core agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    // --- Endpoint ---
    /// Base URL of the update service
    pub server_url: ServerUrl,
    /// Firmware track to follow; `None` falls back to the persisted track
    pub firmware_id: Option<FirmwareId>,

    // --- Protocol ---
    /// Register the identity with `/v1/device/signup` before polling
    pub require_signup: bool,
    /// Authentication headers for check and download
    pub auth: AuthScheme,

    // --- Diagnostics ---
    /// Emit debug-level diagnostics
    pub verbose: bool,

    // --- Timing ---
    /// Backoff base delay (milliseconds)
    pub backoff_base_ms: u32,
    /// Backoff exponent cap; also the retry counter cap
    pub max_backoff_attempts: u32,
    /// Delay after an up-to-date check (milliseconds)
    pub idle_interval_ms: u32,
    /// Transport timeout for signup and check (milliseconds)
    pub check_timeout_ms: u32,
    /// Transport timeout for the image download (milliseconds)
    pub download_timeout_ms: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: ServerUrl::default(),
            firmware_id: None,

            require_signup: true,
            auth: AuthScheme::HeaderPair,

            verbose: false,

            backoff_base_ms: 1000,           // 1 s, 2 s, 4 s … 1024 s
            max_backoff_attempts: 10,
            idle_interval_ms: 10_000,        // 10 s between up-to-date checks
            check_timeout_ms: 5_000,
            download_timeout_ms: 5 * 60_000, // 5 min
        }
    }
}

impl AgentConfig {
    /// Range-check every field. Rejects rather than clamps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.validate()?;
        if self.backoff_base_ms == 0 {
            return Err(ConfigError::OutOfRange("backoff_base_ms"));
        }
        if self.max_backoff_attempts > MAX_BACKOFF_EXPONENT {
            return Err(ConfigError::OutOfRange("max_backoff_attempts"));
        }
        if self
            .backoff_base_ms
            .checked_mul(1 << self.max_backoff_attempts)
            .is_none()
        {
            return Err(ConfigError::OutOfRange("max_backoff_attempts"));
        }
        if self.idle_interval_ms == 0 {
            return Err(ConfigError::OutOfRange("idle_interval_ms"));
        }
        if !(1..=60_000).contains(&self.check_timeout_ms) {
            return Err(ConfigError::OutOfRange("check_timeout_ms"));
        }
        if self.download_timeout_ms < self.check_timeout_ms {
            return Err(ConfigError::OutOfRange("download_timeout_ms"));
        }
        Ok(())
    }
}
