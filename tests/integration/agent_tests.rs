//! Agent loop integration tests: identity bootstrap, signup, the
//! check/apply cycle and backoff, driven step by step against mock ports.

use ota_agent::adapters::nvs::NvsAdapter;
use ota_agent::app::agent::{Agent, AgentState, Ports};
use ota_agent::app::identity::NAMESPACE;
use ota_agent::app::ports::{HttpMethod, InstallError, StorageError, StoragePort, TransportError};
use ota_agent::app::types::{FirmwareHash, FirmwareId};
use ota_agent::config::{AgentConfig, AuthScheme};
use ota_agent::error::{ConfigError, Error};

use crate::mock_ports::{
    CountingRestart, FaultSwitch, FixedEntropy, FlakyStorage, RecordingDelay, Reply,
    ScriptedHttp, ScriptedInstaller,
};

type TestAgent = Agent<
    FlakyStorage,
    ScriptedHttp,
    ScriptedInstaller,
    FixedEntropy,
    CountingRestart,
    RecordingDelay,
>;

const CHECK_FIRST_BOOT: &str = "https://ota.example/v1/check/garden?hash=";

fn config() -> AgentConfig {
    AgentConfig {
        firmware_id: Some(FirmwareId::new("garden").unwrap()),
        require_signup: false,
        ..Default::default()
    }
}

fn hash(s: &str) -> FirmwareHash {
    FirmwareHash::new(s).unwrap()
}

fn agent_on(
    nvs: NvsAdapter,
    config: AgentConfig,
    replies: impl IntoIterator<Item = Reply>,
    installs: impl IntoIterator<Item = Result<u64, InstallError>>,
) -> (TestAgent, FaultSwitch) {
    let (storage, faults) = FlakyStorage::new(nvs);
    let ports = Ports {
        storage,
        http: ScriptedHttp::new(replies),
        installer: ScriptedInstaller::new(installs),
        entropy: FixedEntropy::default(),
        restart: CountingRestart::default(),
        delay: RecordingDelay::default(),
    };
    (Agent::new(config, ports).unwrap(), faults)
}

fn agent(
    config: AgentConfig,
    replies: impl IntoIterator<Item = Reply>,
    installs: impl IntoIterator<Item = Result<u64, InstallError>>,
) -> TestAgent {
    agent_on(NvsAdapter::new().unwrap(), config, replies, installs).0
}

fn steps(agent: &mut TestAgent, n: usize) {
    for _ in 0..n {
        agent.step().unwrap();
    }
}

fn urls(agent: &TestAgent) -> Vec<&str> {
    agent.http().requests.iter().map(|r| r.url.as_str()).collect()
}

// ── Scenario A: fresh device ──────────────────────────────────

#[test]
fn fresh_device_persists_identity_and_checks_with_empty_hash() {
    let mut a = agent(config(), [Reply::status(204)], []);
    assert_eq!(a.state(), &AgentState::Uninitialized);

    a.step().unwrap();
    assert_eq!(a.state(), &AgentState::Polling);
    assert!(a.http().requests.is_empty(), "no network before identity");

    let identity = a.identity().unwrap().clone();
    let mut buf = [0u8; 32];
    let stored = a
        .identity_store()
        .storage()
        .read_bytes(NAMESPACE, "id", &mut buf)
        .unwrap();
    assert_eq!(stored, Some(32));
    assert_eq!(buf, identity.id);

    a.step().unwrap();
    assert_eq!(urls(&a), vec![CHECK_FIRST_BOOT]);
    assert_eq!(a.http().requests[0].timeout_ms, 5_000);
}

#[test]
fn existing_identity_is_reused_across_boots() {
    let mut first = agent(config(), [], []);
    first.bootstrap().unwrap();
    let identity = first.identity().unwrap().clone();

    // Move the same storage into a second agent with different entropy.
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write_bytes(NAMESPACE, "id", &identity.id).unwrap();
    nvs.write_bytes(NAMESPACE, "key", &identity.key).unwrap();
    let (storage, _) = FlakyStorage::new(nvs);
    let ports = Ports {
        storage,
        http: ScriptedHttp::default(),
        installer: ScriptedInstaller::default(),
        entropy: FixedEntropy::starting_at(200),
        restart: CountingRestart::default(),
        delay: RecordingDelay::default(),
    };
    let mut second = Agent::new(config(), ports).unwrap();
    second.bootstrap().unwrap();
    assert_eq!(second.identity(), Some(&identity));
}

#[test]
fn corrupt_stored_id_is_fatal() {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write_bytes(NAMESPACE, "id", &[9; 5]).unwrap();
    let (mut a, _) = agent_on(nvs, config(), [], []);
    assert_eq!(a.step(), Err(Error::Storage(StorageError::InvalidLength)));
    assert_eq!(a.state(), &AgentState::Uninitialized);
}

// ── Scenario B: up to date ────────────────────────────────────

#[test]
fn up_to_date_idles_without_download() {
    let mut a = agent(config(), [Reply::status(204)], []);
    steps(&mut a, 2);

    assert_eq!(a.state(), &AgentState::Polling);
    assert!(a.installer().downloads.is_empty());
    assert_eq!(a.delay().delays_ms, vec![10_000]);
    assert_eq!(a.retry_attempt(), 0);
}

// ── Scenario C: update available ──────────────────────────────

#[test]
fn available_update_is_applied_committed_then_restarted_once() {
    let mut a = agent(
        config(),
        [Reply::body(200, "abc123"), Reply::status(204)],
        [Ok(1024)],
    );

    steps(&mut a, 2);
    assert_eq!(a.state(), &AgentState::Applying(hash("abc123")));

    a.step().unwrap();
    assert_eq!(a.state(), &AgentState::Rebooting);
    assert_eq!(
        a.installer().downloads[0].url,
        "https://ota.example/v1/download/garden/abc123"
    );
    assert_eq!(a.installer().downloads[0].timeout_ms, 300_000);
    // Committed before the restart signal.
    assert_eq!(a.identity_store().applied_hash().unwrap(), Some(hash("abc123")));
    assert_eq!(a.restarter().count, 0);

    a.step().unwrap();
    assert_eq!(a.restarter().count, 1);
    assert_eq!(a.state(), &AgentState::Polling);

    a.step().unwrap();
    assert_eq!(a.restarter().count, 1);
    assert_eq!(
        urls(&a).last().copied(),
        Some("https://ota.example/v1/check/garden?hash=abc123")
    );
}

#[test]
fn check_body_with_trailing_newline_is_accepted() {
    let mut a = agent(config(), [Reply::body(200, "abc123\r\n")], []);
    steps(&mut a, 2);
    assert_eq!(a.state(), &AgentState::Applying(hash("abc123")));
}

#[test]
fn same_hash_as_applied_is_still_applied() {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write_str(NAMESPACE, "hash", "abc123").unwrap();
    let (mut a, _) = agent_on(nvs, config(), [Reply::body(200, "abc123")], [Ok(1)]);
    steps(&mut a, 3);
    assert_eq!(a.installer().downloads.len(), 1);
    assert_eq!(a.state(), &AgentState::Rebooting);
}

// ── Scenario D: not found, then up to date ────────────────────

#[test]
fn not_found_backs_off_exponentially_then_resets() {
    let mut a = agent(
        config(),
        [
            Reply::status(404),
            Reply::status(404),
            Reply::status(404),
            Reply::status(204),
        ],
        [],
    );
    a.step().unwrap();

    let mut attempts = Vec::new();
    for _ in 0..4 {
        a.step().unwrap();
        attempts.push(a.retry_attempt());
    }

    assert_eq!(attempts, vec![1, 2, 3, 0]);
    assert_eq!(a.delay().delays_ms, vec![2_000, 4_000, 8_000, 10_000]);
    assert!(a.installer().downloads.is_empty());
}

// ── Scenario E: incomplete download ───────────────────────────

#[test]
fn incomplete_download_keeps_hash_and_skips_restart() {
    let mut a = agent(
        config(),
        [Reply::body(200, "abc123")],
        [Err(InstallError::IncompleteData)],
    );
    steps(&mut a, 3);

    assert_eq!(a.state(), &AgentState::Polling);
    assert_eq!(a.identity_store().applied_hash().unwrap(), None);
    assert_eq!(a.restarter().count, 0);
    assert_eq!(a.retry_attempt(), 1);
    assert_eq!(a.delay().delays_ms, vec![2_000]);
}

#[test]
fn every_install_stage_failure_returns_to_polling() {
    for stage in [
        InstallError::BeginFailed,
        InstallError::TransferFailed,
        InstallError::FinishFailed,
    ] {
        let mut a = agent(config(), [Reply::body(200, "ff")], [Err(stage)]);
        steps(&mut a, 3);
        assert_eq!(a.state(), &AgentState::Polling, "{stage}");
        assert_eq!(a.identity_store().applied_hash().unwrap(), None);
    }
}

#[test]
fn failed_hash_commit_is_an_apply_failure() {
    let (mut a, faults) = agent_on(
        NvsAdapter::new().unwrap(),
        config(),
        [Reply::body(200, "abc123")],
        [Ok(10)],
    );
    faults.fail_writes_to("hash");
    steps(&mut a, 3);

    assert_eq!(a.state(), &AgentState::Polling);
    assert_eq!(a.restarter().count, 0);
    assert_eq!(a.retry_attempt(), 1);
    assert_eq!(a.identity_store().applied_hash().unwrap(), None);
}

// ── Other check outcomes ──────────────────────────────────────

#[test]
fn unexpected_status_and_transport_errors_back_off() {
    let mut a = agent(
        config(),
        [
            Reply::status(500),
            Reply::Fail(TransportError::Timeout),
            Reply::status(302),
        ],
        [],
    );
    steps(&mut a, 4);
    assert_eq!(a.state(), &AgentState::Polling);
    assert_eq!(a.retry_attempt(), 3);
    assert_eq!(a.delay().delays_ms, vec![2_000, 4_000, 8_000]);
}

#[test]
fn oversized_or_bad_200_body_never_reaches_the_installer() {
    let mut a = agent(
        config(),
        [
            Reply::body(200, &"a".repeat(65)),
            Reply::status(200),
            Reply::body(200, "zzz"),
        ],
        [Ok(1)],
    );
    steps(&mut a, 4);
    assert!(a.installer().downloads.is_empty());
    assert_eq!(a.retry_attempt(), 3);
    assert_eq!(a.identity_store().applied_hash().unwrap(), None);
}

#[test]
fn retry_counter_saturates_at_cap() {
    let cfg = AgentConfig {
        backoff_base_ms: 1,
        max_backoff_attempts: 2,
        ..config()
    };
    let mut a = agent(cfg, std::iter::repeat_n(Reply::status(404), 5), []);
    steps(&mut a, 6);
    assert_eq!(a.retry_attempt(), 2);
    assert_eq!(a.delay().delays_ms, vec![2, 4, 4, 4, 4]);
}

// ── Signup ────────────────────────────────────────────────────

fn signup_config() -> AgentConfig {
    AgentConfig {
        require_signup: true,
        ..config()
    }
}

#[test]
fn unregistered_device_signs_up_before_polling() {
    let mut a = agent(signup_config(), [Reply::status(201), Reply::status(204)], []);
    a.step().unwrap();
    assert_eq!(a.state(), &AgentState::Registering);

    a.step().unwrap();
    assert_eq!(a.state(), &AgentState::Polling);
    assert!(a.identity_store().is_registered().unwrap());

    let signup = &a.http().requests[0];
    assert_eq!(signup.method, HttpMethod::Post);
    assert_eq!(signup.url, "https://ota.example/v1/device/signup");
    assert_eq!(signup.timeout_ms, 5_000);
    let body: serde_json::Value = serde_json::from_slice(signup.body.as_ref().unwrap()).unwrap();
    let identity = a.identity().unwrap();
    assert_eq!(body["id"], identity.id_hex().as_str());
    assert_eq!(body["key"], identity.key_hex().as_str());

    a.step().unwrap();
    assert_eq!(a.http().requests[1].method, HttpMethod::Get);
    assert_eq!(a.http().requests[1].url, CHECK_FIRST_BOOT);
}

#[test]
fn signup_failures_back_off_until_created() {
    let mut a = agent(
        signup_config(),
        [
            Reply::status(500),
            Reply::Fail(TransportError::Connect),
            Reply::status(200),
            Reply::status(201),
        ],
        [],
    );
    steps(&mut a, 4);
    assert_eq!(a.state(), &AgentState::Registering);
    assert_eq!(a.retry_attempt(), 3);
    assert!(!a.identity_store().is_registered().unwrap());

    a.step().unwrap();
    assert_eq!(a.state(), &AgentState::Polling);
    assert_eq!(a.retry_attempt(), 0);
    assert_eq!(a.delay().delays_ms, vec![2_000, 4_000, 8_000]);
}

#[test]
fn registered_device_skips_signup() {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write_bytes(NAMESPACE, "id", &[1; 32]).unwrap();
    nvs.write_bytes(NAMESPACE, "key", &[2; 32]).unwrap();
    nvs.write_bool(NAMESPACE, "signup", true).unwrap();
    let (mut a, _) = agent_on(nvs, signup_config(), [Reply::status(204)], []);
    steps(&mut a, 2);
    assert_eq!(urls(&a), vec![CHECK_FIRST_BOOT]);
}

#[test]
fn signup_flag_write_failure_still_proceeds_to_polling() {
    let (mut a, faults) = agent_on(
        NvsAdapter::new().unwrap(),
        signup_config(),
        [Reply::status(201)],
        [],
    );
    a.step().unwrap();
    faults.fail_writes_to("signup");
    a.step().unwrap();
    assert_eq!(a.state(), &AgentState::Polling);
    assert!(!a.identity_store().is_registered().unwrap());
}

// ── Authentication headers ────────────────────────────────────

#[test]
fn header_pair_auth_on_check_and_download() {
    let mut a = agent(config(), [Reply::body(200, "abc123")], [Ok(1)]);
    steps(&mut a, 3);
    let identity = a.identity().unwrap().clone();

    let check = &a.http().requests[0];
    assert_eq!(check.header("x-ota-device-id"), Some(identity.id_hex().as_str()));
    assert_eq!(check.header("x-ota-device-key"), Some(identity.key_hex().as_str()));
    assert_eq!(a.installer().downloads[0].headers, check.headers);
}

#[test]
fn token_auth_sends_single_header() {
    let cfg = AgentConfig {
        auth: AuthScheme::token("device-token-1").unwrap(),
        ..config()
    };
    let mut a = agent(cfg, [Reply::body(200, "abc123")], [Ok(1)]);
    steps(&mut a, 3);

    let check = &a.http().requests[0];
    assert_eq!(
        check.headers,
        vec![("x-ota-device".to_owned(), "device-token-1".to_owned())]
    );
    assert_eq!(a.installer().downloads[0].headers, check.headers);
}

// ── Configuration ─────────────────────────────────────────────

#[test]
fn missing_firmware_track_is_fatal_before_any_request() {
    let cfg = AgentConfig {
        firmware_id: None,
        ..config()
    };
    let mut a = agent(cfg, [Reply::status(204)], []);
    assert_eq!(a.step(), Err(Error::Config(ConfigError::NoFirmwareTrack)));
    assert!(a.http().requests.is_empty());
}

#[test]
fn run_returns_the_fatal_error() {
    let cfg = AgentConfig {
        firmware_id: None,
        ..config()
    };
    let mut a = agent(cfg, [], []);
    assert_eq!(a.run(), Error::Config(ConfigError::NoFirmwareTrack));
}

#[test]
fn persisted_track_is_used_when_none_configured() {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write_str(NAMESPACE, "firmware", "orchard").unwrap();
    let cfg = AgentConfig {
        firmware_id: None,
        ..config()
    };
    let (mut a, _) = agent_on(nvs, cfg, [Reply::status(204)], []);
    steps(&mut a, 2);
    assert_eq!(a.firmware().map(FirmwareId::as_str), Some("orchard"));
    assert_eq!(urls(&a), vec!["https://ota.example/v1/check/orchard?hash="]);
}

#[test]
fn configured_track_is_persisted() {
    let mut a = agent(config(), [], []);
    a.bootstrap().unwrap();
    assert_eq!(
        a.identity_store().firmware().unwrap().map(|f| f.as_str().to_owned()),
        Some("garden".to_owned())
    );
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let cfg = AgentConfig {
        check_timeout_ms: 0,
        ..config()
    };
    let (storage, _) = FlakyStorage::new(NvsAdapter::new().unwrap());
    let ports = Ports {
        storage,
        http: ScriptedHttp::default(),
        installer: ScriptedInstaller::default(),
        entropy: FixedEntropy::default(),
        restart: CountingRestart::default(),
        delay: RecordingDelay::default(),
    };
    assert!(matches!(
        Agent::new(cfg, ports),
        Err(Error::Config(ConfigError::OutOfRange("check_timeout_ms")))
    ));
}

#[test]
fn configured_timeouts_reach_every_request() {
    let cfg = AgentConfig {
        require_signup: true,
        check_timeout_ms: 1_500,
        download_timeout_ms: 90_000,
        ..config()
    };
    let mut a = agent(cfg, [Reply::status(201), Reply::body(200, "beef")], [Ok(4)]);
    steps(&mut a, 4);

    let timeouts: Vec<u32> = a.http().requests.iter().map(|r| r.timeout_ms).collect();
    assert_eq!(timeouts, vec![1_500, 1_500]);
    assert_eq!(a.installer().downloads[0].timeout_ms, 90_000);
}

#[test]
fn custom_server_url_is_used_for_every_endpoint() {
    let cfg = AgentConfig {
        server_url: ota_agent::app::types::ServerUrl::new("https://updates.example.com").unwrap(),
        require_signup: true,
        ..config()
    };
    let mut a = agent(
        cfg,
        [Reply::status(201), Reply::body(200, "beef")],
        [Ok(4)],
    );
    steps(&mut a, 4);
    assert_eq!(
        urls(&a),
        vec![
            "https://updates.example.com/v1/device/signup",
            "https://updates.example.com/v1/check/garden?hash=",
        ]
    );
    assert_eq!(
        a.installer().downloads[0].url,
        "https://updates.example.com/v1/download/garden/beef"
    );
}
