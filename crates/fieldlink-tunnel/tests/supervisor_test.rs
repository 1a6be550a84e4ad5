//! Tunnel supervisor scenarios with a fake client, scripted interfaces and
//! fixed latency

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fieldlink_core::{TunnelConnectionState, TunnelEvent, TunnelMode};
use fieldlink_tunnel::{
    FallbackPolicy, InterfaceProbe, ManagedProcess, ProcessLauncher, ProcessState,
    ReachabilityProbe, TunnelConfig, TunnelError, TunnelInterface, TunnelResult,
    TunnelSupervisor,
};
use tempfile::TempDir;
use tokio::time::Instant;

// =============================================================================
// Test doubles
// =============================================================================

fn tun0() -> TunnelInterface {
    TunnelInterface {
        name: "tun0".to_string(),
        address: Ipv4Addr::new(10, 8, 0, 6),
    }
}

/// Returns scripted results first, then the current interface
#[derive(Default)]
struct ScriptedInterfaces {
    script: Mutex<VecDeque<Option<TunnelInterface>>>,
    current: Mutex<Option<TunnelInterface>>,
}

impl ScriptedInterfaces {
    fn set(&self, interface: Option<TunnelInterface>) {
        *self.current.lock().unwrap() = interface;
    }

    fn script(&self, results: Vec<Option<TunnelInterface>>) {
        self.script.lock().unwrap().extend(results);
    }
}

impl InterfaceProbe for ScriptedInterfaces {
    fn detect(&self) -> Option<TunnelInterface> {
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        self.current.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct ProcessLog {
    close_requests: AtomicUsize,
    kills: AtomicUsize,
}

struct FakeProcess {
    state: ProcessState,
    stops_on_request: bool,
    log: Arc<ProcessLog>,
}

#[async_trait]
impl ManagedProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn state(&mut self) -> ProcessState {
        self.state
    }

    async fn request_close(&mut self) -> bool {
        self.log.close_requests.fetch_add(1, Ordering::SeqCst);
        if self.stops_on_request {
            self.state = ProcessState::Exited(Some(0));
        }
        true
    }

    async fn kill(&mut self) {
        self.log.kills.fetch_add(1, Ordering::SeqCst);
        self.state = ProcessState::Exited(None);
    }
}

#[derive(Clone, Copy)]
enum ClientBehavior {
    /// The interface appears as soon as the client starts
    BringsUp,
    /// The client dies right away
    ExitsImmediately,
    /// Runs but never creates an interface
    Hangs,
    /// Brings the link up but ignores close requests
    Stubborn,
}

struct FakeLauncher {
    available: bool,
    behavior: ClientBehavior,
    interfaces: Arc<ScriptedInterfaces>,
    launches: AtomicUsize,
    log: Arc<ProcessLog>,
}

impl FakeLauncher {
    fn new(available: bool, behavior: ClientBehavior, interfaces: Arc<ScriptedInterfaces>) -> Self {
        Self {
            available,
            behavior,
            interfaces,
            launches: AtomicUsize::new(0),
            log: Arc::new(ProcessLog::default()),
        }
    }

    fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn launch(&self, config_path: &Path) -> TunnelResult<Box<dyn ManagedProcess>> {
        assert!(config_path.exists());
        self.launches.fetch_add(1, Ordering::SeqCst);

        let (state, stops_on_request) = match self.behavior {
            ClientBehavior::BringsUp => {
                self.interfaces.set(Some(tun0()));
                (ProcessState::Running, true)
            }
            ClientBehavior::ExitsImmediately => (ProcessState::Exited(Some(1)), true),
            ClientBehavior::Hangs => (ProcessState::Running, true),
            ClientBehavior::Stubborn => {
                self.interfaces.set(Some(tun0()));
                (ProcessState::Running, false)
            }
        };
        Ok(Box::new(FakeProcess {
            state,
            stops_on_request,
            log: self.log.clone(),
        }))
    }
}

struct FixedLatency(Option<Duration>);

#[async_trait]
impl ReachabilityProbe for FixedLatency {
    async fn probe(&self, _endpoint: &str, _timeout: Duration) -> Option<Duration> {
        self.0
    }
}

struct Harness {
    supervisor: Arc<TunnelSupervisor>,
    launcher: Arc<FakeLauncher>,
    interfaces: Arc<ScriptedInterfaces>,
    _dir: TempDir,
}

fn harness(
    fallback: FallbackPolicy,
    available: bool,
    behavior: ClientBehavior,
    artifact: Option<&str>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = TunnelConfig {
        config_path: dir.path().join("client.ovpn"),
        fallback,
        ..Default::default()
    };
    if let Some(contents) = artifact {
        std::fs::write(&config.config_path, contents).unwrap();
    }

    let interfaces = Arc::new(ScriptedInterfaces::default());
    let launcher = Arc::new(FakeLauncher::new(available, behavior, interfaces.clone()));
    let supervisor = Arc::new(TunnelSupervisor::new(
        config,
        launcher.clone(),
        interfaces.clone(),
        Arc::new(FixedLatency(Some(Duration::from_millis(20)))),
    ));
    Harness {
        supervisor,
        launcher,
        interfaces,
        _dir: dir,
    }
}

const VALID_ARTIFACT: &str = "client\ndev tun\nremote vpn.example.com 1194\n";

fn drain(
    rx: &mut tokio::sync::broadcast::Receiver<fieldlink_core::Event<TunnelEvent>>,
) -> Vec<TunnelEvent> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| e.into_payload())
        .collect()
}

// =============================================================================
// Connect
// =============================================================================

#[tokio::test]
async fn test_existing_tunnel_short_circuits() {
    let h = harness(
        FallbackPolicy::Never,
        true,
        ClientBehavior::BringsUp,
        Some(VALID_ARTIFACT),
    );
    h.interfaces.set(Some(tun0()));

    let status = h.supervisor.connect().await.unwrap();
    assert!(status.connected);
    assert_eq!(status.mode, Some(TunnelMode::External));
    assert_eq!(status.local_address, Some(Ipv4Addr::new(10, 8, 0, 6)));
    assert_eq!(status.latency_ms, 20.0);
    assert_eq!(h.launcher.launches(), 0);
    assert_eq!(h.supervisor.state(), TunnelConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_managed_client_brings_link_up() {
    let h = harness(
        FallbackPolicy::Never,
        true,
        ClientBehavior::BringsUp,
        Some(VALID_ARTIFACT),
    );
    let mut events = h.supervisor.subscribe();

    let status = h.supervisor.connect().await.unwrap();
    assert_eq!(status.mode, Some(TunnelMode::Managed));
    assert_eq!(status.interface.as_deref(), Some("tun0"));
    assert_eq!(h.launcher.launches(), 1);

    let states: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            TunnelEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            TunnelConnectionState::Connecting,
            TunnelConnectionState::Connected
        ]
    );

    // A second connect sees the interface and keeps the managed client
    let again = h.supervisor.connect().await.unwrap();
    assert_eq!(again.mode, Some(TunnelMode::Managed));
    assert_eq!(h.launcher.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_early_client_exit_fails_fast() {
    let h = harness(
        FallbackPolicy::ClientUnavailable,
        true,
        ClientBehavior::ExitsImmediately,
        Some(VALID_ARTIFACT),
    );

    let started = Instant::now();
    let err = h.supervisor.connect().await.unwrap_err();
    assert!(matches!(err, TunnelError::ProcessExited { code: Some(1) }));
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(h.supervisor.state(), TunnelConnectionState::Disconnected);
    let status = h.supervisor.status();
    assert!(!status.connected);
    assert!(status.error.is_some());
    // Already exited, nothing to stop
    assert_eq!(h.launcher.log.kills.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_detection_timeout_stops_client() {
    let h = harness(
        FallbackPolicy::ClientUnavailable,
        true,
        ClientBehavior::Hangs,
        Some(VALID_ARTIFACT),
    );

    let started = Instant::now();
    let err = h.supervisor.connect().await.unwrap_err();
    assert!(matches!(err, TunnelError::DetectionTimeout(_)));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(20));
    assert!(waited < Duration::from_secs(30));
    assert_eq!(h.launcher.log.close_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_detection_timeout_simulates_when_always() {
    let h = harness(
        FallbackPolicy::Always,
        true,
        ClientBehavior::Hangs,
        Some(VALID_ARTIFACT),
    );

    let status = h.supervisor.connect().await.unwrap();
    assert_eq!(status.mode, Some(TunnelMode::Simulated));
}

#[tokio::test]
async fn test_missing_artifact_falls_back_to_simulation() {
    let h = harness(
        FallbackPolicy::ClientUnavailable,
        true,
        ClientBehavior::BringsUp,
        None,
    );

    let status = h.supervisor.connect().await.unwrap();
    assert_eq!(status.mode, Some(TunnelMode::Simulated));
    let address = status.local_address.unwrap();
    assert_eq!(address.octets()[..3], [10, 8, 0]);
    assert!((15.0..=80.0).contains(&status.latency_ms));
    assert_eq!(h.launcher.launches(), 0);

    let latency = h.supervisor.measure_latency().await;
    assert!((15.0..=80.0).contains(&latency));

    // Status checks keep a simulated link up
    let checked = h.supervisor.check_status().await;
    assert!(checked.connected);
    assert_eq!(checked.local_address, Some(address));
}

#[tokio::test]
async fn test_forced_simulation_never_launches() {
    let dir = tempfile::tempdir().unwrap();
    let interfaces = Arc::new(ScriptedInterfaces::default());
    interfaces.set(Some(tun0()));
    let launcher = Arc::new(FakeLauncher::new(true, ClientBehavior::BringsUp, interfaces.clone()));
    let supervisor = TunnelSupervisor::new(
        TunnelConfig {
            config_path: dir.path().join("client.ovpn"),
            simulate: true,
            ..Default::default()
        },
        launcher.clone(),
        interfaces,
        Arc::new(FixedLatency(Some(Duration::from_millis(20)))),
    );

    let status = supervisor.connect().await.unwrap();
    assert_eq!(status.mode, Some(TunnelMode::Simulated));
    assert_eq!(launcher.launches(), 0);
    assert!(!dir.path().join("client.ovpn").exists());
}

#[tokio::test]
async fn test_template_without_fallback_fails() {
    let h = harness(FallbackPolicy::Never, true, ClientBehavior::BringsUp, None);

    let err = h.supervisor.connect().await.unwrap_err();
    assert!(matches!(err, TunnelError::NotConfigured(_)));
    assert_eq!(h.launcher.launches(), 0);
}

#[tokio::test]
async fn test_corrupt_artifact_fails_even_with_fallback() {
    let h = harness(
        FallbackPolicy::Always,
        true,
        ClientBehavior::BringsUp,
        Some("client\ndev tun\n"),
    );

    let err = h.supervisor.connect().await.unwrap_err();
    assert!(matches!(err, TunnelError::CorruptConfig { .. }));
    assert_eq!(h.supervisor.state(), TunnelConnectionState::Disconnected);
}

// =============================================================================
// Reconnect policy
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_stops_at_cap_until_explicit_connect() {
    let h = harness(
        FallbackPolicy::Never,
        false,
        ClientBehavior::BringsUp,
        Some(VALID_ARTIFACT),
    );
    h.interfaces.set(Some(tun0()));
    h.supervisor.connect().await.unwrap();
    let mut events = h.supervisor.subscribe();

    h.interfaces.set(None);
    let status = h.supervisor.check_status().await;
    assert!(!status.connected);
    assert!(h.supervisor.is_halted());
    assert_eq!(h.supervisor.state(), TunnelConnectionState::Disconnected);

    let events = drain(&mut events);
    let attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            TunnelEvent::ReconnectAttempt { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(events
        .iter()
        .any(|e| matches!(e, TunnelEvent::ReconnectExhausted { attempts: 3 })));

    // Halted: the next check does not try again
    let mut events = h.supervisor.subscribe();
    h.supervisor.check_status().await;
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, TunnelEvent::ReconnectAttempt { .. })));

    h.interfaces.set(Some(tun0()));
    let status = h.supervisor.connect().await.unwrap();
    assert!(status.connected);
    assert!(!h.supervisor.is_halted());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_counter_resets_after_success() {
    let h = harness(
        FallbackPolicy::Never,
        false,
        ClientBehavior::BringsUp,
        Some(VALID_ARTIFACT),
    );
    h.interfaces.set(Some(tun0()));
    h.supervisor.connect().await.unwrap();

    // Lost on the check, still gone on attempt 1, back on attempt 2
    h.interfaces.script(vec![None, None]);
    let mut events = h.supervisor.subscribe();
    let status = h.supervisor.check_status().await;
    assert!(status.connected);
    assert_eq!(h.supervisor.state(), TunnelConnectionState::Connected);
    assert!(!h.supervisor.is_halted());

    // The next loss starts counting from one again
    h.interfaces.set(None);
    h.supervisor.check_status().await;
    let attempts: Vec<u32> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            TunnelEvent::ReconnectAttempt { attempt, .. } => Some(attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_lost_reachability_is_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let interfaces = Arc::new(ScriptedInterfaces::default());
    interfaces.set(Some(tun0()));
    let launcher = Arc::new(FakeLauncher::new(false, ClientBehavior::BringsUp, interfaces.clone()));
    let supervisor = TunnelSupervisor::new(
        TunnelConfig {
            config_path: dir.path().join("client.ovpn"),
            ..Default::default()
        },
        launcher,
        interfaces,
        Arc::new(FixedLatency(None)),
    );

    let status = supervisor.connect().await.unwrap();
    assert!(status.connected);
    assert!(!status.has_latency());

    supervisor.check_status().await;
    assert_eq!(supervisor.state(), TunnelConnectionState::Degraded);
}

// =============================================================================
// Disconnect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_disconnect_twice_is_idempotent() {
    let h = harness(
        FallbackPolicy::Never,
        true,
        ClientBehavior::BringsUp,
        Some(VALID_ARTIFACT),
    );
    h.supervisor.connect().await.unwrap();

    h.supervisor.disconnect().await;
    let first = h.supervisor.status();
    h.supervisor.disconnect().await;
    let second = h.supervisor.status();

    assert_eq!(first, second);
    assert!(!second.connected);
    assert_eq!(second.local_address, None);
    assert_eq!(second.interface, None);
    assert_eq!(h.supervisor.state(), TunnelConnectionState::Disconnected);
    assert_eq!(h.launcher.log.close_requests.load(Ordering::SeqCst), 1);
    assert_eq!(h.launcher.log.kills.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_abandons_reconnect_backoff() {
    let h = harness(
        FallbackPolicy::Never,
        false,
        ClientBehavior::BringsUp,
        Some(VALID_ARTIFACT),
    );
    h.interfaces.set(Some(tun0()));
    h.supervisor.connect().await.unwrap();
    let mut events = h.supervisor.subscribe();

    h.interfaces.set(None);
    let supervisor = h.supervisor.clone();
    let check = tokio::spawn(async move { supervisor.check_status().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    h.supervisor.disconnect().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    let status = check.await.unwrap();
    assert!(!status.connected);
    assert!(!h.supervisor.is_halted());
    assert_eq!(h.supervisor.state(), TunnelConnectionState::Disconnected);

    let events = drain(&mut events);
    let attempts = events
        .iter()
        .filter(|e| matches!(e, TunnelEvent::ReconnectAttempt { .. }))
        .count();
    assert_eq!(attempts, 1);
    assert!(!events
        .iter()
        .any(|e| matches!(e, TunnelEvent::ReconnectExhausted { .. })));

    // Nothing keeps running behind the disconnect
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.supervisor.state(), TunnelConnectionState::Disconnected);
    assert!(!h.supervisor.check_status().await.connected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cuts_detection_wait_short() {
    let h = harness(
        FallbackPolicy::Always,
        true,
        ClientBehavior::Hangs,
        Some(VALID_ARTIFACT),
    );
    let supervisor = h.supervisor.clone();
    let connect = tokio::spawn(async move { supervisor.connect().await });
    tokio::time::sleep(Duration::from_secs(2)).await;

    let started = Instant::now();
    h.supervisor.disconnect().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    // Abandoned, not replaced by a simulated link
    let result = connect.await.unwrap();
    assert!(matches!(result, Err(TunnelError::Cancelled)));
    assert_eq!(h.supervisor.state(), TunnelConnectionState::Disconnected);
    assert_eq!(h.supervisor.status().mode, None);
    assert_eq!(h.launcher.log.close_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stubborn_client_is_killed() {
    let h = harness(
        FallbackPolicy::Never,
        true,
        ClientBehavior::Stubborn,
        Some(VALID_ARTIFACT),
    );
    h.supervisor.connect().await.unwrap();

    let started = Instant::now();
    h.supervisor.disconnect().await;
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(h.launcher.log.close_requests.load(Ordering::SeqCst), 1);
    assert_eq!(h.launcher.log.kills.load(Ordering::SeqCst), 1);
}
