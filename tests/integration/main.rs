//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the update agent against
//! mock ports. All tests run on the host (x86_64) with no network, flash
//! or reboot required.

#![cfg(not(target_os = "espidf"))]

mod agent_tests;
