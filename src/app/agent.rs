//! Agent loop: the always-running update state machine.
//!
//! ```text
//!  Uninitialized ──▶ Registering ──▶ Polling ⇄ Applying ──▶ Rebooting
//!        │            (retry ↺)      (idle/retry ↺)            │
//!        └──────── signup not required ──▶ Polling ◀───────────┘
//! ```
//!
//! [`Agent::step`] performs exactly one transition, including the delay it
//! implies, so tests drive the machine one edge at a time. [`Agent::run`]
//! repeats it forever and only returns on a fatal error.
//!
//! Retry bookkeeping: the counter resets on an up-to-date check, on a
//! successful signup and on a successful apply. Every not-found, transport,
//! protocol or apply failure bumps it by one (capped) and waits
//! `base * 2^attempt`.

use std::thread::{self, JoinHandle};

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use super::applier;
use super::auth::AuthHeaders;
use super::backoff::RetryState;
use super::checker::{self, CheckOutcome};
use super::identity::IdentityStore;
use super::ports::{EntropyPort, HttpPort, InstallPort, RestartPort, StoragePort};
use super::registration;
use super::types::{DeviceIdentity, FirmwareHash, FirmwareId};
use crate::config::AgentConfig;
use crate::error::{ConfigError, Error, Result};

/// Name of the worker thread (FreeRTOS task on the device).
pub const TASK_NAME: &str = "ota_task";
/// Worker stack size in bytes.
pub const TASK_STACK_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    /// Identity not loaded yet.
    Uninitialized,
    /// Waiting for the server to acknowledge the identity.
    Registering,
    /// Asking the server for updates.
    Polling,
    /// A candidate image is being downloaded and installed.
    Applying(FirmwareHash),
    /// The new hash is committed; the next step restarts the device.
    Rebooting,
}

/// Every collaborator the agent drives.
pub struct Ports<S, H, I, E, R, D> {
    pub storage: S,
    pub http: H,
    pub installer: I,
    pub entropy: E,
    pub restart: R,
    pub delay: D,
}

/// State resolved once at bootstrap.
struct Session {
    identity: DeviceIdentity,
    firmware: FirmwareId,
    auth: AuthHeaders,
}

pub struct Agent<S, H, I, E, R, D> {
    config: AgentConfig,
    store: IdentityStore<S>,
    http: H,
    installer: I,
    entropy: E,
    restart: R,
    delay: D,
    state: AgentState,
    session: Option<Session>,
    retry: RetryState,
}

impl<S, H, I, E, R, D> Agent<S, H, I, E, R, D>
where
    S: StoragePort,
    H: HttpPort,
    I: InstallPort,
    E: EntropyPort,
    R: RestartPort,
    D: DelayNs,
{
    /// Validate `config` and take ownership of the ports.
    ///
    /// Does not touch the network. Identity is loaded by the first
    /// [`step`](Self::step) (or an explicit [`bootstrap`](Self::bootstrap)).
    pub fn new(config: AgentConfig, ports: Ports<S, H, I, E, R, D>) -> Result<Self> {
        config.validate()?;
        let store = IdentityStore::open(ports.storage)?;
        let retry = RetryState::new(config.backoff_base_ms, config.max_backoff_attempts);
        Ok(Self {
            config,
            store,
            http: ports.http,
            installer: ports.installer,
            entropy: ports.entropy,
            restart: ports.restart,
            delay: ports.delay,
            state: AgentState::Uninitialized,
            session: None,
            retry,
        })
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn retry_attempt(&self) -> u32 {
        self.retry.attempt()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn identity_store(&self) -> &IdentityStore<S> {
        &self.store
    }

    /// The loaded identity, once bootstrapped.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    /// The firmware track being followed, once bootstrapped.
    pub fn firmware(&self) -> Option<&FirmwareId> {
        self.session.as_ref().map(|s| &s.firmware)
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    pub fn installer(&self) -> &I {
        &self.installer
    }

    pub fn restarter(&self) -> &R {
        &self.restart
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Load or create the identity and resolve the firmware track.
    ///
    /// Errors here are fatal: a broken store or a missing track would have
    /// the loop poll an undefined endpoint forever. No-op once past
    /// [`AgentState::Uninitialized`].
    pub fn bootstrap(&mut self) -> Result<()> {
        if self.state != AgentState::Uninitialized {
            return Ok(());
        }

        let identity = self
            .store
            .ensure_identity(&mut self.entropy)
            .inspect_err(|e| error!("NVS: identity bootstrap failed: {}", e))?;
        let firmware = self
            .resolve_firmware()
            .inspect_err(|e| error!("OTA: cannot start: {}", e))?;
        let registered = if self.config.require_signup {
            self.store
                .is_registered()
                .inspect_err(|e| error!("NVS: cannot read signup flag: {}", e))?
        } else {
            true
        };

        info!(
            "OTA: device {} following '{}' at {}",
            identity.id_hex(),
            firmware,
            self.config.server_url
        );

        let auth = AuthHeaders::new(&self.config.auth, &identity);
        self.session = Some(Session {
            identity,
            firmware,
            auth,
        });
        self.state = if registered {
            AgentState::Polling
        } else {
            info!("Signup: device not registered yet");
            AgentState::Registering
        };
        Ok(())
    }

    /// Configured track wins and is persisted; otherwise fall back to the
    /// persisted one.
    fn resolve_firmware(&mut self) -> Result<FirmwareId> {
        if let Some(id) = self.config.firmware_id.clone() {
            self.store.set_firmware(Some(&id))?;
            return Ok(id);
        }
        self.store
            .firmware()?
            .ok_or(Error::Config(ConfigError::NoFirmwareTrack))
    }

    /// Perform one state transition.
    ///
    /// Returns `Err` only for fatal conditions. Recoverable failures are
    /// absorbed here with a backoff delay.
    pub fn step(&mut self) -> Result<()> {
        match &self.state {
            AgentState::Uninitialized => self.bootstrap(),
            AgentState::Registering => self.register_step(),
            AgentState::Polling => self.poll_step(),
            AgentState::Applying(hash) => {
                let hash = hash.clone();
                self.apply_step(&hash)
            }
            AgentState::Rebooting => {
                self.reboot_step();
                Ok(())
            }
        }
    }

    /// Step until a fatal error. Never returns under normal operation.
    pub fn run(&mut self) -> Error {
        loop {
            if let Err(e) = self.step() {
                error!("OTA: agent stopped: {}", e);
                return e;
            }
        }
    }

    // ── Transitions ───────────────────────────────────────────

    fn register_step(&mut self) -> Result<()> {
        let Some(session) = &self.session else {
            self.state = AgentState::Uninitialized;
            return Ok(());
        };

        match registration::register(
            &mut self.http,
            &self.config.server_url,
            &session.identity,
            self.config.check_timeout_ms,
        ) {
            Ok(()) => {
                info!("Signup: device registered");
                if let Err(e) = self.store.mark_registered() {
                    warn!("NVS: failed to persist signup flag: {}", e);
                }
                self.retry.reset();
                self.state = AgentState::Polling;
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                self.back_off();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn poll_step(&mut self) -> Result<()> {
        let Some(session) = &self.session else {
            self.state = AgentState::Uninitialized;
            return Ok(());
        };

        let applied = self.store.applied_hash().unwrap_or_else(|e| {
            warn!("NVS: applied hash unreadable, checking without it: {}", e);
            None
        });
        let outcome = {
            let headers = session.auth.pairs();
            checker::check(
                &mut self.http,
                &self.config.server_url,
                &session.firmware,
                applied.as_ref(),
                &headers,
                self.config.check_timeout_ms,
            )
        };

        match outcome {
            Ok(CheckOutcome::UpToDate) => {
                self.retry.reset();
                debug!("Check: up to date, next check in {} ms", self.config.idle_interval_ms);
                self.delay.delay_ms(self.config.idle_interval_ms);
                Ok(())
            }
            Ok(CheckOutcome::Available(hash)) => {
                info!("Check: update available: {}", hash);
                self.state = AgentState::Applying(hash);
                Ok(())
            }
            Ok(CheckOutcome::NotFound) => {
                warn!("Check: firmware '{}' not found on server", session.firmware);
                self.back_off();
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                self.back_off();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn apply_step(&mut self, hash: &FirmwareHash) -> Result<()> {
        let Some(session) = &self.session else {
            self.state = AgentState::Uninitialized;
            return Ok(());
        };

        let result = {
            let headers = session.auth.pairs();
            applier::apply(
                &mut self.installer,
                &self.config.server_url,
                &session.firmware,
                hash,
                &headers,
                self.config.download_timeout_ms,
            )
        };

        match result {
            Ok(_) => {
                // The hash must be durable before the restart is requested.
                if let Err(e) = self.store.commit_applied_hash(hash) {
                    warn!("NVS: failed to commit hash {}: {}", hash, e);
                    self.state = AgentState::Polling;
                    self.back_off();
                    return Ok(());
                }
                info!("OTA: committed {}", hash);
                self.retry.reset();
                self.state = AgentState::Rebooting;
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                self.state = AgentState::Polling;
                self.back_off();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn reboot_step(&mut self) {
        info!("OTA: restarting into new firmware");
        self.restart.restart();
        // Only reached when the restart port is simulated.
        debug!("OTA: restart returned, resuming polling");
        self.state = AgentState::Polling;
    }

    fn back_off(&mut self) {
        let delay = self.retry.record_failure();
        debug!(
            "OTA: retry {}/{} in {} ms",
            self.retry.attempt(),
            self.config.max_backoff_attempts,
            delay
        );
        self.delay.delay_ms(delay);
    }
}

impl<S, H, I, E, R, D> Agent<S, H, I, E, R, D>
where
    S: StoragePort + Send + 'static,
    H: HttpPort + Send + 'static,
    I: InstallPort + Send + 'static,
    E: EntropyPort + Send + 'static,
    R: RestartPort + Send + 'static,
    D: DelayNs + Send + 'static,
{
    /// Move the agent onto its own worker thread and run it there.
    ///
    /// The handle yields the fatal error that stopped the loop.
    pub fn spawn(mut self) -> std::io::Result<JoinHandle<Error>> {
        thread::Builder::new()
            .name(TASK_NAME.into())
            .stack_size(TASK_STACK_SIZE)
            .spawn(move || self.run())
    }
}
