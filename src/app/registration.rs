//! Registration client: one-shot signup handshake.
//!
//! `POST <server>/v1/device/signup` with `{"id": hex, "key": hex}`.
//! Exactly 201 counts as success. No retries here: the agent loop owns
//! backoff so signup and polling share one policy.

use core::fmt::Write;

use log::{debug, warn};
use serde::Serialize;

use super::ports::{HttpMethod, HttpPort, HttpRequest};
use super::types::{DeviceIdentity, ServerUrl, UrlString};
use crate::error::{ConfigError, Error, ProtocolError, Result};

pub const SIGNUP_CREATED: u16 = 201;

#[derive(Serialize)]
struct SignupBody<'a> {
    id: &'a str,
    key: &'a str,
}

pub fn signup_url(server: &ServerUrl) -> Result<UrlString> {
    let mut url = UrlString::new();
    write!(url, "{}/v1/device/signup", server.base()).map_err(|_| ConfigError::UrlTooLong)?;
    Ok(url)
}

/// Render the JSON signup body.
pub fn signup_body(identity: &DeviceIdentity) -> Vec<u8> {
    let id = identity.id_hex();
    let key = identity.key_hex();
    let body = SignupBody {
        id: id.as_str(),
        key: key.as_str(),
    };
    // Two plain string fields: serialisation can't fail.
    serde_json::to_vec(&body).unwrap_or_default()
}

/// Exchange the identity for server-side acknowledgement.
pub fn register(
    http: &mut impl HttpPort,
    server: &ServerUrl,
    identity: &DeviceIdentity,
    timeout_ms: u32,
) -> Result<()> {
    let url = signup_url(server)?;
    let body = signup_body(identity);
    let headers = [("Content-Type", "application/json")];

    debug!("Signup: POST {}", url);
    let request = HttpRequest {
        method: HttpMethod::Post,
        url: &url,
        headers: &headers,
        body: Some(&body),
        timeout_ms,
    };

    let response = http.send(&request, &mut []).map_err(|e| {
        warn!("Signup: request failed: {}", e);
        Error::Transport(e)
    })?;

    debug!("Signup: status code {}", response.status);
    if response.status != SIGNUP_CREATED {
        warn!("Signup: unexpected status code {}", response.status);
        return Err(ProtocolError::UnexpectedStatus(response.status).into());
    }
    Ok(())
}
