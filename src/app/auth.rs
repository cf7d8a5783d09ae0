//! Device authentication headers for check and download requests.
//!
//! Two schemes exist in the field, selected once at construction through
//! [`AuthScheme`]: the hex id/key header pair, and a single opaque token.

use super::types::{DeviceIdentity, HexString};
use crate::config::AuthScheme;

pub const HEADER_DEVICE_ID: &str = "x-ota-device-id";
pub const HEADER_DEVICE_KEY: &str = "x-ota-device-key";
pub const HEADER_DEVICE_TOKEN: &str = "x-ota-device";

/// Owned header values, rendered once per agent.
#[derive(Clone)]
pub enum AuthHeaders {
    Pair { id: HexString, key: HexString },
    Token(heapless::String<64>),
}

impl AuthHeaders {
    pub fn new(scheme: &AuthScheme, identity: &DeviceIdentity) -> Self {
        match scheme {
            AuthScheme::HeaderPair => Self::Pair {
                id: identity.id_hex(),
                key: identity.key_hex(),
            },
            AuthScheme::DeviceToken { token } => Self::Token(token.clone()),
        }
    }

    /// Borrowed `(name, value)` pairs for an [`HttpRequest`](super::ports::HttpRequest).
    pub fn pairs(&self) -> heapless::Vec<(&str, &str), 2> {
        let mut out = heapless::Vec::new();
        match self {
            Self::Pair { id, key } => {
                let _ = out.push((HEADER_DEVICE_ID, id.as_str()));
                let _ = out.push((HEADER_DEVICE_KEY, key.as_str()));
            }
            Self::Token(token) => {
                let _ = out.push((HEADER_DEVICE_TOKEN, token.as_str()));
            }
        }
        out
    }
}
