//! Update checker: asks the server whether a newer image exists.
//!
//! `GET <server>/v1/check/<firmware_id>?hash=<applied or empty>`
//!
//! | Status | Outcome                                     |
//! |--------|---------------------------------------------|
//! | 204    | [`CheckOutcome::UpToDate`]                  |
//! | 200    | [`CheckOutcome::Available`], body = hash    |
//! | 404    | [`CheckOutcome::NotFound`]                  |
//! | other  | `Err(Protocol(UnexpectedStatus))`           |
//!
//! A 200 body is read in full before the session is released. Anything
//! longer than 64 characters is an error, never a truncated hash.

use core::fmt::Write;

use log::{debug, warn};

use super::ports::{HttpMethod, HttpPort, HttpRequest};
use super::types::{FIRMWARE_HASH_MAX_LEN, FirmwareHash, FirmwareId, ServerUrl, UrlString};
use crate::error::{ConfigError, Error, ProtocolError, Result};

pub const STATUS_AVAILABLE: u16 = 200;
pub const STATUS_UP_TO_DATE: u16 = 204;
pub const STATUS_NOT_FOUND: u16 = 404;

/// Room for a 64-char hash plus a trailing newline or CRLF.
const BODY_BUF_LEN: usize = FIRMWARE_HASH_MAX_LEN + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    UpToDate,
    Available(FirmwareHash),
    /// The server doesn't know this firmware track (yet).
    NotFound,
}

/// Build the check URL. No applied hash yet means `hash=` with an empty
/// value.
pub fn check_url(
    server: &ServerUrl,
    firmware: &FirmwareId,
    applied: Option<&FirmwareHash>,
) -> Result<UrlString> {
    let mut url = UrlString::new();
    let hash = applied.map_or("", FirmwareHash::as_str);
    write!(url, "{}/v1/check/{}?hash={}", server.base(), firmware, hash)
        .map_err(|_| ConfigError::UrlTooLong)?;
    Ok(url)
}

/// Parse the body of a 200 response into a hash.
pub fn parse_hash_body(body: &[u8], truncated: bool) -> core::result::Result<FirmwareHash, ProtocolError> {
    if truncated {
        return Err(ProtocolError::BodyTooLarge);
    }
    let text = core::str::from_utf8(body)
        .map_err(|_| ProtocolError::InvalidHash)?
        .trim_matches(|c: char| c.is_ascii_whitespace());
    if text.is_empty() {
        return Err(ProtocolError::EmptyBody);
    }
    if text.len() > FIRMWARE_HASH_MAX_LEN {
        return Err(ProtocolError::BodyTooLarge);
    }
    FirmwareHash::new(text).map_err(|_| ProtocolError::InvalidHash)
}

/// Issue one check request.
pub fn check(
    http: &mut impl HttpPort,
    server: &ServerUrl,
    firmware: &FirmwareId,
    applied: Option<&FirmwareHash>,
    auth_headers: &[(&str, &str)],
    timeout_ms: u32,
) -> Result<CheckOutcome> {
    let url = check_url(server, firmware, applied)?;
    debug!("Check: GET {}", url);

    let request = HttpRequest {
        method: HttpMethod::Get,
        url: &url,
        headers: auth_headers,
        body: None,
        timeout_ms,
    };
    let mut body = [0u8; BODY_BUF_LEN];
    let response = http.send(&request, &mut body).map_err(|e| {
        warn!("Check: request failed: {}", e);
        Error::Transport(e)
    })?;

    debug!("Check: status code {}", response.status);
    match response.status {
        STATUS_UP_TO_DATE => Ok(CheckOutcome::UpToDate),
        STATUS_NOT_FOUND => Ok(CheckOutcome::NotFound),
        STATUS_AVAILABLE => {
            let hash = parse_hash_body(&body[..response.body_len], response.truncated)
                .inspect_err(|e| warn!("Check: bad 200 body: {}", e))?;
            Ok(CheckOutcome::Available(hash))
        }
        other => {
            warn!("Check: unexpected status code {}", other);
            Err(ProtocolError::UnexpectedStatus(other).into())
        }
    }
}
