//! Length-checked value types shared by the agent components.
//!
//! Bounds are enforced at construction; nothing downstream truncates.

use core::fmt::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const FIRMWARE_ID_MAX_LEN: usize = 26;
pub const FIRMWARE_HASH_MAX_LEN: usize = 64;
pub const SERVER_URL_MAX_LEN: usize = 128;
pub const IDENTITY_LEN: usize = 32;

/// Lowercase hex rendering of a 32-byte identity half.
pub type HexString = heapless::String<{ IDENTITY_LEN * 2 }>;

/// Bounded buffer for every request URL the agent builds.
pub type UrlString = heapless::String<256>;

fn bounded<const N: usize>(value: &str) -> Option<heapless::String<N>> {
    let mut s = heapless::String::new();
    s.push_str(value).ok()?;
    Some(s)
}

// ───────────────────────────────────────────────────────────────
// Firmware track
// ───────────────────────────────────────────────────────────────

/// The update channel a device follows. 1 to 26 chars of `[A-Za-z0-9._-]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FirmwareId(heapless::String<FIRMWARE_ID_MAX_LEN>);

impl FirmwareId {
    pub fn new(value: &str) -> Result<Self, ConfigError> {
        let url_safe = value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
        if value.is_empty() || !url_safe {
            return Err(ConfigError::InvalidFirmwareId);
        }
        bounded(value)
            .map(Self)
            .ok_or(ConfigError::InvalidFirmwareId)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FirmwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FirmwareId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<FirmwareId> for String {
    fn from(id: FirmwareId) -> Self {
        id.0.as_str().into()
    }
}

// ───────────────────────────────────────────────────────────────
// Firmware hash
// ───────────────────────────────────────────────────────────────

/// Content fingerprint of a firmware image. 1 to 64 ASCII hex chars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareHash(heapless::String<FIRMWARE_HASH_MAX_LEN>);

impl FirmwareHash {
    pub fn new(value: &str) -> Result<Self, ConfigError> {
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidHash);
        }
        bounded(value).map(Self).ok_or(ConfigError::InvalidHash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FirmwareHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ───────────────────────────────────────────────────────────────
// Server URL
// ───────────────────────────────────────────────────────────────

/// Base URL of the update service. ASCII `https://`, at most 128 chars,
/// no query, fragment, whitespace or control characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerUrl(heapless::String<SERVER_URL_MAX_LEN>);

impl ServerUrl {
    pub fn new(value: &str) -> Result<Self, ConfigError> {
        let host = value
            .strip_prefix("https://")
            .ok_or(ConfigError::InvalidServerUrl)?;
        if host.is_empty() || host.starts_with('/') {
            return Err(ConfigError::InvalidServerUrl);
        }
        // Request paths are appended as-is, so nothing may turn them into a
        // query or fragment.
        let reserved = |b: u8| {
            !b.is_ascii() || b.is_ascii_whitespace() || b.is_ascii_control() || b == b'?' || b == b'#'
        };
        if value.bytes().any(reserved) {
            return Err(ConfigError::InvalidServerUrl);
        }
        bounded(value)
            .map(Self)
            .ok_or(ConfigError::InvalidServerUrl)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URL without trailing slashes, ready for `/v1/...` to be appended.
    pub fn base(&self) -> &str {
        self.0.trim_end_matches('/')
    }
}

impl fmt::Display for ServerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for ServerUrl {
    fn default() -> Self {
        let mut s = heapless::String::new();
        let _ = s.push_str(crate::config::DEFAULT_SERVER_URL);
        Self(s)
    }
}

impl TryFrom<String> for ServerUrl {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ServerUrl> for String {
    fn from(url: ServerUrl) -> Self {
        url.0.as_str().into()
    }
}

// ───────────────────────────────────────────────────────────────
// Device identity
// ───────────────────────────────────────────────────────────────

/// Random id/key pair naming this unit to the server.
///
/// Generated once, persisted before first use, never regenerated unless
/// storage is wiped. `Debug` redacts the key.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub id: [u8; IDENTITY_LEN],
    pub key: [u8; IDENTITY_LEN],
}

impl DeviceIdentity {
    pub fn id_hex(&self) -> HexString {
        to_hex(&self.id)
    }

    pub fn key_hex(&self) -> HexString {
        to_hex(&self.key)
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("id", &self.id_hex().as_str())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Lowercase hex of a 32-byte value.
pub fn to_hex(bytes: &[u8; IDENTITY_LEN]) -> HexString {
    let mut hex = HexString::new();
    for b in bytes {
        // Capacity is exactly 2 * IDENTITY_LEN.
        let _ = write!(hex, "{:02x}", b);
    }
    hex
}
