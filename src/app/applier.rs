//! Update applier: hands a candidate image to the installer.
//!
//! `GET <server>/v1/download/<firmware_id>/<hash>` with the same auth
//! headers as the check. The installer owns the HTTP session and the
//! partition; this module only builds the request and flattens every
//! install failure into [`Error::Apply`]. Nothing is persisted here.

use core::fmt::Write;

use log::{debug, info, warn};

use super::ports::{DownloadRequest, InstallPort};
use super::types::{FirmwareHash, FirmwareId, ServerUrl, UrlString};
use crate::error::{ConfigError, Error, Result};

pub fn download_url(
    server: &ServerUrl,
    firmware: &FirmwareId,
    hash: &FirmwareHash,
) -> Result<UrlString> {
    let mut url = UrlString::new();
    write!(url, "{}/v1/download/{}/{}", server.base(), firmware, hash)
        .map_err(|_| ConfigError::UrlTooLong)?;
    Ok(url)
}

/// Download and install `hash`. Returns the image size on a clean finish.
pub fn apply(
    installer: &mut impl InstallPort,
    server: &ServerUrl,
    firmware: &FirmwareId,
    hash: &FirmwareHash,
    auth_headers: &[(&str, &str)],
    timeout_ms: u32,
) -> Result<u64> {
    let url = download_url(server, firmware, hash)?;
    debug!("OTA: downloading {}", url);

    let request = DownloadRequest {
        url: &url,
        headers: auth_headers,
        timeout_ms,
    };
    match installer.install(&request) {
        Ok(bytes) => {
            info!("OTA: installed {} ({} bytes)", hash, bytes);
            Ok(bytes)
        }
        Err(e) => {
            warn!("OTA: install of {} failed: {}", hash, e);
            Err(Error::Apply(e))
        }
    }
}
