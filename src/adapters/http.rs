//! HTTPS client adapter.
//!
//! Implements [`HttpPort`] for signup and check requests.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspHttpConnection` with the ESP-IDF
//!   certificate bundle attached as trust anchor.
//! - **all other targets**: `reqwest` blocking client (rustls, webpki
//!   roots) for host-side simulation.
//!
//! ## Connection model
//!
//! One connection per request. The connection is owned by the `send()`
//! frame and dropped on every exit path, so no session outlives a call.
//! The body is read until EOF; bytes past the caller's buffer are drained
//! and reported through [`HttpResponse::truncated`].

use log::{debug, warn};

use crate::app::ports::{HttpMethod, HttpPort, HttpRequest, HttpResponse, TransportError};

#[cfg(target_os = "espidf")]
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

/// Read from `read` until EOF, filling `buf` and then draining the rest.
///
/// Returns the number of bytes stored and whether anything was dropped.
pub(crate) fn fill_body<E>(
    mut read: impl FnMut(&mut [u8]) -> Result<usize, E>,
    buf: &mut [u8],
) -> Result<(usize, bool), E> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = read(&mut buf[filled..])?;
        if n == 0 {
            return Ok((filled, false));
        }
        filled += n;
    }

    let mut truncated = false;
    let mut scratch = [0u8; 64];
    loop {
        let n = read(&mut scratch)?;
        if n == 0 {
            return Ok((filled, truncated));
        }
        truncated = true;
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

/// Open a TLS-capable connection with the bundled CA certificates.
#[cfg(target_os = "espidf")]
pub(crate) fn connect(timeout_ms: u32) -> Result<EspHttpConnection, esp_idf_svc::sys::EspError> {
    EspHttpConnection::new(&Configuration {
        timeout: Some(core::time::Duration::from_millis(u64::from(timeout_ms))),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    })
}

#[cfg(target_os = "espidf")]
#[derive(Debug, Default)]
pub struct HttpClient;

#[cfg(target_os = "espidf")]
impl HttpClient {
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self)
    }
}

#[cfg(target_os = "espidf")]
impl HttpPort for HttpClient {
    fn send(
        &mut self,
        request: &HttpRequest<'_>,
        body: &mut [u8],
    ) -> Result<HttpResponse, TransportError> {
        use core::fmt::Write;
        use esp_idf_svc::http::Method;

        let mut conn = connect(request.timeout_ms).map_err(|e| {
            warn!("HTTP: client init failed: {}", e);
            TransportError::Init
        })?;

        let method = match request.method {
            HttpMethod::Get => Method::Get,
            HttpMethod::Post => Method::Post,
        };

        let mut content_length = heapless::String::<12>::new();
        let mut headers: Vec<(&str, &str)> = request.headers.to_vec();
        if let Some(payload) = request.body {
            let _ = write!(content_length, "{}", payload.len());
            headers.push(("Content-Length", content_length.as_str()));
        }

        conn.initiate_request(method, request.url, &headers)
            .map_err(|e| {
                warn!("HTTP: connect to {} failed: {}", request.url, e);
                TransportError::Connect
            })?;

        if let Some(payload) = request.body {
            let mut offset = 0;
            while offset < payload.len() {
                let n = conn.write(&payload[offset..]).map_err(|e| {
                    warn!("HTTP: request write failed: {}", e);
                    TransportError::Send
                })?;
                if n == 0 {
                    return Err(TransportError::Send);
                }
                offset += n;
            }
        }

        conn.initiate_response().map_err(|e| {
            warn!("HTTP: no response: {}", e);
            TransportError::Receive
        })?;
        let status = conn.status();

        let (body_len, truncated) = fill_body(|b| conn.read(b), body).map_err(|e| {
            warn!("HTTP: body read failed: {}", e);
            TransportError::Receive
        })?;

        debug!("HTTP: {} -> {} ({} bytes)", request.url, status, body_len);
        Ok(HttpResponse {
            status,
            body_len,
            truncated,
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Host backend
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub struct HttpClient {
    client: reqwest::blocking::Client,
}

#[cfg(not(target_os = "espidf"))]
impl HttpClient {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder().build().map_err(|e| {
            warn!("HTTP: client init failed: {}", e);
            TransportError::Init
        })?;
        Ok(Self { client })
    }

    pub(crate) fn request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(&str, &str)],
        timeout_ms: u32,
    ) -> reqwest::blocking::RequestBuilder {
        let builder = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        headers
            .iter()
            .fold(builder, |b, (name, value)| b.header(*name, *value))
            .timeout(std::time::Duration::from_millis(u64::from(timeout_ms)))
    }
}

#[cfg(not(target_os = "espidf"))]
pub(crate) fn transport_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect
    } else if e.is_builder() {
        TransportError::Init
    } else {
        TransportError::Send
    }
}

#[cfg(not(target_os = "espidf"))]
impl HttpPort for HttpClient {
    fn send(
        &mut self,
        request: &HttpRequest<'_>,
        body: &mut [u8],
    ) -> Result<HttpResponse, TransportError> {
        use std::io::Read;

        let mut builder = self.request(
            request.method,
            request.url,
            request.headers,
            request.timeout_ms,
        );
        if let Some(payload) = request.body {
            builder = builder.body(payload.to_vec());
        }

        let mut response = builder.send().map_err(|e| {
            warn!("HTTP: {} failed: {}", request.url, e);
            transport_error(&e)
        })?;
        let status = response.status().as_u16();

        let (body_len, truncated) = fill_body(|b| response.read(b), body).map_err(|e| {
            warn!("HTTP: body read failed: {}", e);
            if e.kind() == std::io::ErrorKind::TimedOut {
                TransportError::Timeout
            } else {
                TransportError::Receive
            }
        })?;

        debug!("HTTP: {} -> {} ({} bytes)", request.url, status, body_len);
        Ok(HttpResponse {
            status,
            body_len,
            truncated,
        })
    }
}
