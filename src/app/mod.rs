//! Application core: the update agent, zero I/O.
//!
//! Identity bootstrap, signup, check, apply and the loop that ties them
//! together. All interaction with the device happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable on the
//! host.

pub mod agent;
pub mod applier;
pub mod auth;
pub mod backoff;
pub mod checker;
pub mod identity;
pub mod ports;
pub mod registration;
pub mod types;
