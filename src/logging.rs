//! Log output and verbosity.
//!
//! Every module logs through the `log` facade with a subsystem prefix
//! (`OTA:`, `Signup:`, `Check:`, `NVS:`, `HTTP:`). On the device the
//! ESP-IDF logger forwards records to UART / USB-CDC. On the host the
//! embedding application installs whatever logger it likes.

use log::LevelFilter;

/// Install the platform logger and apply the verbosity setting.
///
/// Call once, early. A second call on the device fails because a logger
/// is already installed.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    #[cfg(target_os = "espidf")]
    {
        use anyhow::Context;
        esp_idf_logger::init().context("installing ESP-IDF logger")?;
    }

    set_verbose(verbose);
    Ok(())
}

/// `true` lets URLs, status codes and retry timings through (`Debug`);
/// `false` keeps state changes and failures only (`Info`).
pub fn set_verbose(verbose: bool) {
    log::set_max_level(level_for(verbose));
}

pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}
