//! Firmware installer: streams an image over HTTPS into the inactive slot.
//!
//! Implements [`InstallPort`].
//!
//! Flow: GET (auth headers) → begin → N × write → length check → finish
//!
//! | Stage          | Failure                          | Error            |
//! |----------------|----------------------------------|------------------|
//! | begin          | connect, non-200, slot open      | `BeginFailed`    |
//! | perform        | read or flash write              | `TransferFailed` |
//! | length check   | fewer bytes than Content-Length  | `IncompleteData` |
//! | finish         | image validation, boot switch    | `FinishFailed`   |
//!
//! - **`target_os = "espidf"`**: `EspHttpConnection` → `esp_ota::OtaUpdate`.
//!   Dropping an unfinished `OtaUpdate` aborts it, so the running slot
//!   stays bootable on every error path.
//! - **all other targets**: [`FileInstaller`] writes `<slot>.partial` and
//!   renames it over `<slot>` on a clean finish.

use log::{debug, info, warn};

use crate::app::ports::{DownloadRequest, InstallError, InstallPort};

/// Transfer chunk size.
const CHUNK_SIZE: usize = 4096;

const STATUS_OK: u16 = 200;

/// Chunks between progress lines while streaming.
const PROGRESS_EVERY: u32 = 32;

/// Count one written chunk and emit a progress line every
/// [`PROGRESS_EVERY`] chunks. Returns whether a line was emitted.
fn note_progress(chunks: &mut u32, written: u64, expected: Option<u64>) -> bool {
    *chunks += 1;
    if *chunks % PROGRESS_EVERY != 0 {
        return false;
    }
    match expected {
        Some(len) => debug!("OTA: {} of {} bytes written", written, len),
        None => debug!("OTA: {} bytes written", written),
    }
    true
}

/// Classify a stream that stopped early.
///
/// With a known length, any shortfall is incomplete data; without one an
/// error mid-stream is a transfer failure.
fn short_read(expected: Option<u64>, written: u64) -> InstallError {
    match expected {
        Some(len) if written < len => InstallError::IncompleteData,
        _ => InstallError::TransferFailed,
    }
}

/// Final size checks once the stream hit EOF.
fn check_complete(expected: Option<u64>, written: u64) -> Result<(), InstallError> {
    if written == 0 {
        warn!("OTA: empty image");
        return Err(InstallError::IncompleteData);
    }
    if let Some(len) = expected {
        if written != len {
            warn!("OTA: received {} of {} bytes", written, len);
            return Err(InstallError::IncompleteData);
        }
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
#[derive(Debug, Default)]
pub struct OtaInstaller;

#[cfg(target_os = "espidf")]
impl OtaInstaller {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "espidf")]
impl InstallPort for OtaInstaller {
    fn install(&mut self, request: &DownloadRequest<'_>) -> Result<u64, InstallError> {
        use esp_idf_svc::http::Method;

        // ── begin ──
        let mut conn = super::http::connect(request.timeout_ms).map_err(|e| {
            warn!("OTA: HTTP client init failed: {}", e);
            InstallError::BeginFailed
        })?;
        conn.initiate_request(Method::Get, request.url, request.headers)
            .map_err(|e| {
                warn!("OTA: connect failed: {}", e);
                InstallError::BeginFailed
            })?;
        conn.initiate_response().map_err(|e| {
            warn!("OTA: no response: {}", e);
            InstallError::BeginFailed
        })?;
        let status = conn.status();
        if status != STATUS_OK {
            warn!("OTA: download returned status code {}", status);
            return Err(InstallError::BeginFailed);
        }
        let expected = conn
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        debug!("OTA: image size {:?}", expected);

        let mut update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("OTA: esp-ota begin failed: {:?}", e);
            InstallError::BeginFailed
        })?;

        // ── perform ──
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written: u64 = 0;
        let mut chunks: u32 = 0;
        loop {
            let n = conn.read(&mut buf).map_err(|e| {
                warn!("OTA: read failed after {} bytes: {}", written, e);
                short_read(expected, written)
            })?;
            if n == 0 {
                break;
            }
            update.write(&buf[..n]).map_err(|e| {
                warn!("OTA: esp-ota write failed: {:?}", e);
                InstallError::TransferFailed
            })?;
            written += n as u64;
            note_progress(&mut chunks, written, expected);
        }

        check_complete(expected, written)?;

        // ── finish ──
        let mut completed = update.finalize().map_err(|e| {
            warn!("OTA: esp-ota finalize failed: {:?}", e);
            InstallError::FinishFailed
        })?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("OTA: esp-ota set_as_boot_partition failed: {:?}", e);
            InstallError::FinishFailed
        })?;

        info!("OTA: image written ({} bytes), boot partition switched", written);
        Ok(written)
    }
}

// ───────────────────────────────────────────────────────────────
// Host backend
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub struct FileInstaller {
    slot: std::path::PathBuf,
    http: super::http::HttpClient,
}

#[cfg(not(target_os = "espidf"))]
impl FileInstaller {
    /// Install images to `slot`. The parent directory must exist.
    pub fn new(slot: impl Into<std::path::PathBuf>) -> Result<Self, InstallError> {
        let http = super::http::HttpClient::new().map_err(|_| InstallError::BeginFailed)?;
        Ok(Self {
            slot: slot.into(),
            http,
        })
    }

    pub fn slot(&self) -> &std::path::Path {
        &self.slot
    }

    fn partial_path(&self) -> std::path::PathBuf {
        let mut name = self.slot.clone().into_os_string();
        name.push(".partial");
        name.into()
    }

    fn transfer(
        &self,
        request: &DownloadRequest<'_>,
        partial: &std::path::Path,
    ) -> Result<u64, InstallError> {
        use std::io::{Read, Write};

        // ── begin ──
        let mut response = self
            .http
            .request(
                crate::app::ports::HttpMethod::Get,
                request.url,
                request.headers,
                request.timeout_ms,
            )
            .send()
            .map_err(|e| {
                warn!("OTA: download request failed: {}", e);
                InstallError::BeginFailed
            })?;
        let status = response.status().as_u16();
        if status != STATUS_OK {
            warn!("OTA: download returned status code {}", status);
            return Err(InstallError::BeginFailed);
        }
        let expected = response.content_length();
        debug!("OTA: image size {:?}", expected);

        let mut file = std::fs::File::create(partial).map_err(|e| {
            warn!("OTA: cannot open slot {}: {}", partial.display(), e);
            InstallError::BeginFailed
        })?;

        // ── perform ──
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written: u64 = 0;
        let mut chunks: u32 = 0;
        loop {
            let n = response.read(&mut buf).map_err(|e| {
                warn!("OTA: read failed after {} bytes: {}", written, e);
                short_read(expected, written)
            })?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).map_err(|e| {
                warn!("OTA: slot write failed: {}", e);
                InstallError::TransferFailed
            })?;
            written += n as u64;
            note_progress(&mut chunks, written, expected);
        }

        check_complete(expected, written)?;

        // ── finish ──
        file.sync_all().map_err(|e| {
            warn!("OTA: slot sync failed: {}", e);
            InstallError::FinishFailed
        })?;
        drop(file);
        std::fs::rename(partial, &self.slot).map_err(|e| {
            warn!("OTA: slot commit failed: {}", e);
            InstallError::FinishFailed
        })?;
        Ok(written)
    }
}

#[cfg(not(target_os = "espidf"))]
impl InstallPort for FileInstaller {
    fn install(&mut self, request: &DownloadRequest<'_>) -> Result<u64, InstallError> {
        let partial = self.partial_path();
        match self.transfer(request, &partial) {
            Ok(written) => {
                info!(
                    "OTA: image written to {} ({} bytes)",
                    self.slot.display(),
                    written
                );
                Ok(written)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                Err(e)
            }
        }
    }
}
