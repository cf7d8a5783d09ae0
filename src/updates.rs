//! `OtaUpdates`: the entry point the embedding firmware calls.
//!
//! ```ignore
//! let mut ota = OtaUpdates::new();
//! ota.set_server("https://updates.example.com/")?;
//! ota.set_verbose(true);
//! ota.follow(Some("sensor-node"))?; // spawns `ota_task` and returns
//! ```
//!
//! Configuration is validated and the device identity bootstrapped on the
//! caller's thread, so a bad setup surfaces as an error from `follow*`
//! instead of a loop that never does anything useful.

use std::thread::JoinHandle;

use anyhow::{Context, bail};
use embedded_hal::delay::DelayNs;
use log::info;

use crate::app::agent::{Agent, Ports};
use crate::app::ports::{EntropyPort, HttpPort, InstallPort, RestartPort, StoragePort};
use crate::app::types::{FirmwareId, ServerUrl};
use crate::config::{AgentConfig, AuthScheme};
use crate::error::Error;
use crate::logging;

#[derive(Default)]
pub struct OtaUpdates {
    config: AgentConfig,
    worker: Option<JoinHandle<Error>>,
}

impl OtaUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AgentConfig) -> Self {
        Self {
            config,
            worker: None,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Point the agent at a different update server.
    pub fn set_server(&mut self, url: &str) -> anyhow::Result<()> {
        self.config.server_url =
            ServerUrl::new(url).with_context(|| format!("invalid server url '{url}'"))?;
        Ok(())
    }

    /// Toggle debug-level diagnostics. Takes effect immediately.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.config.verbose = verbose;
        logging::set_verbose(verbose);
    }

    pub fn set_signup_required(&mut self, required: bool) {
        self.config.require_signup = required;
    }

    pub fn set_auth(&mut self, auth: AuthScheme) {
        self.config.auth = auth;
    }

    /// Whether the worker has been started and hasn't stopped.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Start following `firmware_id` with the given adapters.
    ///
    /// `None` follows the track persisted by an earlier call. Returns once
    /// the worker thread is running.
    pub fn follow_with<S, H, I, E, R, D>(
        &mut self,
        firmware_id: Option<&str>,
        ports: Ports<S, H, I, E, R, D>,
    ) -> anyhow::Result<()>
    where
        S: StoragePort + Send + 'static,
        H: HttpPort + Send + 'static,
        I: InstallPort + Send + 'static,
        E: EntropyPort + Send + 'static,
        R: RestartPort + Send + 'static,
        D: DelayNs + Send + 'static,
    {
        if self.is_running() {
            bail!("OTA agent is already running");
        }

        let mut config = self.config.clone();
        if let Some(id) = firmware_id {
            let id = FirmwareId::new(id).with_context(|| format!("invalid firmware id '{id}'"))?;
            config.firmware_id = Some(id);
        }
        config.validate().context("invalid OTA configuration")?;
        logging::set_verbose(config.verbose);

        let mut agent = Agent::new(config, ports).context("creating OTA agent")?;
        agent.bootstrap().context("bootstrapping OTA agent")?;
        if let Some(track) = agent.firmware() {
            self.config.firmware_id = Some(track.clone());
        }

        let worker = agent.spawn().context("spawning OTA task")?;
        info!("OTA: agent task started");
        self.worker = Some(worker);
        Ok(())
    }

    /// Start following `firmware_id` on the device's own NVS, HTTPS client
    /// and OTA partitions.
    #[cfg(target_os = "espidf")]
    pub fn follow(&mut self, firmware_id: Option<&str>) -> anyhow::Result<()> {
        use crate::adapters::{
            entropy::SystemEntropy, http::HttpClient, nvs::NvsAdapter, ota::OtaInstaller,
            restart::DeviceRestart,
        };

        let ports = Ports {
            storage: NvsAdapter::new().context("initialising NVS")?,
            http: HttpClient::new().context("initialising HTTP client")?,
            installer: OtaInstaller::new(),
            entropy: SystemEntropy,
            restart: DeviceRestart::new(),
            delay: esp_idf_hal::delay::FreeRtos,
        };
        self.follow_with(firmware_id, ports)
    }
}
