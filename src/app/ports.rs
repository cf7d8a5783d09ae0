//! Port traits: the hexagonal boundary between the update agent and the
//! device it runs on.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Agent (domain)
//! ```
//!
//! Everything the agent delegates (key/value persistence, HTTPS, writing the
//! image to flash, entropy, restarting) sits behind one of these traits.
//! The [`Agent`](super::agent::Agent) consumes them via generics, so the
//! loop itself never touches ESP-IDF.
//!
//! Pacing uses [`embedded_hal::delay::DelayNs`] directly instead of a
//! bespoke port.
//!
//! ## Contract notes
//!
//! - **StoragePort** reads of a missing key return `Ok(None)`, never an error.
//! - **StoragePort** writes are atomic per call; there are no cross-key
//!   transactions, so callers order their writes.
//! - **HttpPort** and **InstallPort** own their HTTP session for the
//!   duration of one call and release it on every exit path.

use core::fmt;

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Namespaced, typed key/value persistence.
pub trait StoragePort {
    /// Ensure `namespace` exists. Idempotent.
    fn create(&mut self, namespace: &str) -> Result<(), StorageError>;

    /// Read a blob into `buf`. Returns the blob length, or `None` if absent.
    ///
    /// A blob longer than `buf` is reported as [`StorageError::InvalidLength`].
    fn read_bytes(
        &self,
        namespace: &str,
        key: &str,
        buf: &mut [u8],
    ) -> Result<Option<usize>, StorageError>;

    /// Write a blob atomically.
    fn write_bytes(&mut self, namespace: &str, key: &str, data: &[u8])
    -> Result<(), StorageError>;

    /// Read a string into `buf` and return the borrowed text, or `None`.
    fn read_str<'b>(
        &self,
        namespace: &str,
        key: &str,
        buf: &'b mut [u8],
    ) -> Result<Option<&'b str>, StorageError>;

    /// Write a string atomically.
    fn write_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError>;

    /// Read a boolean flag, or `None` if it was never written.
    fn read_bool(&self, namespace: &str, key: &str) -> Result<Option<bool>, StorageError>;

    /// Write a boolean flag atomically.
    fn write_bool(&mut self, namespace: &str, key: &str, value: bool) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Erase every key in `namespace`.
    fn erase_all(&mut self, namespace: &str) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// HTTP port (driven adapter: domain → TLS/HTTP client)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One outbound request. Borrowed so callers can build it on the stack.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub method: HttpMethod,
    pub url: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: Option<&'a [u8]>,
    pub timeout_ms: u32,
}

/// Status line plus how much of the body landed in the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Bytes written to the body buffer.
    pub body_len: usize,
    /// `true` if the server sent more than the buffer could hold.
    pub truncated: bool,
}

/// Performs a single HTTPS exchange.
///
/// Implementations read the response body into `body` in full, up to its
/// length, and set [`HttpResponse::truncated`] if anything was left over.
pub trait HttpPort {
    fn send(
        &mut self,
        request: &HttpRequest<'_>,
        body: &mut [u8],
    ) -> Result<HttpResponse, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Install port (driven adapter: domain → OTA partition writer)
// ───────────────────────────────────────────────────────────────

/// Where to fetch a firmware image and which headers to send with it.
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    /// Attached to every HTTP interaction the installer makes.
    pub headers: &'a [(&'a str, &'a str)],
    pub timeout_ms: u32,
}

/// Streams an image into the inactive slot and marks it bootable.
///
/// Returns `Ok` only once the image has been completely received,
/// verified and committed. Any failure leaves the running slot untouched.
pub trait InstallPort {
    /// Returns the number of image bytes written.
    fn install(&mut self, request: &DownloadRequest<'_>) -> Result<u64, InstallError>;
}

// ───────────────────────────────────────────────────────────────
// Entropy port
// ───────────────────────────────────────────────────────────────

/// Cryptographically strong random bytes.
pub trait EntropyPort {
    fn fill_bytes(&mut self, buf: &mut [u8]);
}

// ───────────────────────────────────────────────────────────────
// Restart port
// ───────────────────────────────────────────────────────────────

/// Reboots into the newly installed firmware.
///
/// On hardware this never returns. Host adapters may return so the loop
/// can continue in simulation.
pub trait RestartPort {
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Stored value does not fit the caller's buffer or expected size.
    InvalidLength,
    /// Key exists with a different type.
    TypeMismatch,
    /// Key or value contains bytes the backend can't store (e.g. NUL).
    InvalidValue,
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength => write!(f, "stored value has unexpected length"),
            Self::TypeMismatch => write!(f, "stored value has a different type"),
            Self::InvalidValue => write!(f, "value cannot be stored"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

/// Errors from [`HttpPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Client could not be created (bad URL, out of memory).
    Init,
    /// TCP connect or TLS handshake failed.
    Connect,
    /// The request could not be written.
    Send,
    /// Status line, headers or body could not be read.
    Receive,
    /// The exchange did not finish within the request timeout.
    Timeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "HTTP client init failed"),
            Self::Connect => write!(f, "connect/TLS handshake failed"),
            Self::Send => write!(f, "request write failed"),
            Self::Receive => write!(f, "response read failed"),
            Self::Timeout => write!(f, "request timed out"),
        }
    }
}

/// Errors from [`InstallPort`] operations.
///
/// The stage is kept for diagnostics only; the agent handles every variant
/// the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallError {
    /// Connection, status check, or partition open failed.
    BeginFailed,
    /// Streaming or flash write failed mid-transfer.
    TransferFailed,
    /// Stream ended before the advertised image size.
    IncompleteData,
    /// Image validation or boot-partition switch failed.
    FinishFailed,
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::TransferFailed => write!(f, "OTA transfer failed"),
            Self::IncompleteData => write!(f, "OTA image incomplete"),
            Self::FinishFailed => write!(f, "OTA finish failed"),
        }
    }
}

impl std::error::Error for StorageError {}
impl std::error::Error for TransportError {}
impl std::error::Error for InstallError {}
