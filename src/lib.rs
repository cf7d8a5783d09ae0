//! Field-device firmware update agent.
//!
//! Periodically asks an update server whether a newer image exists for the
//! firmware track this device follows, downloads and installs it into the
//! inactive slot, records its hash, and restarts.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                     │
//! │  NvsAdapter  HttpClient  OtaInstaller  SystemEntropy  Restart │
//! │                                                               │
//! │  ───────────────── Port Trait Boundary ─────────────────      │
//! │                                                               │
//! │   ┌───────────────────────────────────────────────────────┐   │
//! │   │                 Agent (pure logic)                    │   │
//! │   │ identity · signup · check · apply · backoff           │   │
//! │   └───────────────────────────────────────────────────────┘   │
//! │                                                               │
//! │  OtaUpdates facade (set server · verbose · follow firmware)   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each adapter; host builds get simulation backends.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod updates;

pub use app::agent::{Agent, AgentState, Ports};
pub use config::{AgentConfig, AuthScheme};
pub use error::{Error, Result};
pub use updates::OtaUpdates;
