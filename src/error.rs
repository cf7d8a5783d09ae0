//! Unified error types for the update agent.
//!
//! Every fallible operation funnels into [`Error`] so the agent loop can
//! decide recovery in one place: transport, protocol and apply failures are
//! retried with backoff, configuration failures halt the loop before it
//! starts. All variants are `Copy` so outcomes can be logged and stored
//! without allocation.

use core::fmt;

use crate::app::ports::{InstallError, StorageError, TransportError};

// ---------------------------------------------------------------------------
// Top-level agent error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Connection, TLS or timeout failure reported by the HTTP collaborator.
    Transport(TransportError),
    /// The server answered, but not in a way the protocol allows.
    Protocol(ProtocolError),
    /// Invalid or missing configuration. Fatal: the loop never starts.
    Config(ConfigError),
    /// Download-and-flash failed at any stage.
    Apply(InstallError),
    /// The key/value store refused a read or write.
    Storage(StorageError),
}

impl Error {
    /// Whether the agent loop may recover from this error by backing off.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Protocol(_) | Self::Apply(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Apply(e) => write!(f, "apply: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Status code outside the set the endpoint defines.
    UnexpectedStatus(u16),
    /// A 200 check body did not fit in 64 characters.
    BodyTooLarge,
    /// A 200 check body was empty.
    EmptyBody,
    /// A 200 check body was not a hex fingerprint.
    InvalidHash,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedStatus(code) => write!(f, "unexpected status code {code}"),
            Self::BodyTooLarge => write!(f, "response body exceeds 64 characters"),
            Self::EmptyBody => write!(f, "response body is empty"),
            Self::InvalidHash => write!(f, "response body is not a hex hash"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No firmware track passed in and none persisted.
    NoFirmwareTrack,
    /// Firmware id empty, longer than 26 chars, or not URL-safe.
    InvalidFirmwareId,
    /// Hash empty, longer than 64 chars, or not hex.
    InvalidHash,
    /// Server URL missing `https://`, or longer than 128 chars.
    InvalidServerUrl,
    /// Device token empty, too long, or not printable ASCII.
    InvalidToken,
    /// A request URL did not fit its bounded buffer.
    UrlTooLong,
    /// A numeric field is out of range. Names the field.
    OutOfRange(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFirmwareTrack => write!(f, "no firmware track configured"),
            Self::InvalidFirmwareId => {
                write!(f, "firmware id must be 1-26 chars of [A-Za-z0-9._-]")
            }
            Self::InvalidHash => write!(f, "hash must be 1-64 hex chars"),
            Self::InvalidServerUrl => {
                write!(f, "server url must start with https:// and be at most 128 chars")
            }
            Self::InvalidToken => write!(f, "device token must be 1-64 printable ASCII chars"),
            Self::UrlTooLong => write!(f, "request url exceeds buffer"),
            Self::OutOfRange(field) => write!(f, "{field} out of range"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<InstallError> for Error {
    fn from(e: InstallError) -> Self {
        Self::Apply(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
