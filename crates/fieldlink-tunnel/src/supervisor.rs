//! Tunnel process supervisor
//!
//! State machine:
//!
//! ```text
//! Idle -> Connecting -> Connected <-> Degraded -> Reconnecting -> Connected
//!                  \                                        \
//!                   -> Disconnected <---------------------- -> Disconnected
//! ```
//!
//! All process and interface state lives behind one lock. The periodic
//! status check skips its tick while a connect or disconnect holds it. A
//! disconnect request cuts short a reconnect loop or detection wait that
//! holds the lock.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use fieldlink_core::{
    Event, EventBus, TunnelConnectionState, TunnelEvent, TunnelMode, TunnelStatus,
};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::artifact::{ensure_artifact, ArtifactStatus};
use crate::config::{FallbackPolicy, TunnelConfig};
use crate::error::{TunnelError, TunnelResult};
use crate::interface::{InterfaceProbe, SystemInterfaceProbe, TunnelInterface};
use crate::latency::{measure_latency, ReachabilityProbe, TcpReachability};
use crate::process::{ClientLauncher, ManagedProcess, ProcessLauncher, ProcessState};
use crate::reconnect::ReconnectCounter;

/// How often the interface and process are checked while connecting
const DETECTION_POLL: Duration = Duration::from_millis(500);

/// How often the process is checked during a graceful stop
const STOP_POLL: Duration = Duration::from_millis(100);

struct SupervisorInner {
    process: Option<Box<dyn ManagedProcess>>,
    mode: Option<TunnelMode>,
    interface: Option<TunnelInterface>,
    /// Synthetic address while simulating
    simulated_address: Option<Ipv4Addr>,
    reconnect: ReconnectCounter,
    rng: StdRng,
}

/// How a connect attempt ended without a real link
enum Failure {
    /// Report the error
    Fail(TunnelError),
    /// Fall back to a simulated link
    Simulate(TunnelError),
}

/// Launches, monitors and recovers the tunnel client
pub struct TunnelSupervisor {
    config: TunnelConfig,
    launcher: Arc<dyn ProcessLauncher>,
    interfaces: Arc<dyn InterfaceProbe>,
    reachability: Arc<dyn ReachabilityProbe>,
    inner: Mutex<SupervisorInner>,
    state: RwLock<TunnelConnectionState>,
    status: RwLock<TunnelStatus>,
    /// Set when the reconnect cap was reached; cleared by an explicit connect
    halted: AtomicBool,
    /// Set while a disconnect waits for the lock
    disconnecting: AtomicBool,
    /// Wakes waits that must end when a disconnect is requested
    cancel: Notify,
    events: EventBus<TunnelEvent>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl TunnelSupervisor {
    pub fn new(
        config: TunnelConfig,
        launcher: Arc<dyn ProcessLauncher>,
        interfaces: Arc<dyn InterfaceProbe>,
        reachability: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        let reconnect = ReconnectCounter::new(config.reconnect.max_attempts);
        Self {
            config,
            launcher,
            interfaces,
            reachability,
            inner: Mutex::new(SupervisorInner {
                process: None,
                mode: None,
                interface: None,
                simulated_address: None,
                reconnect,
                rng: StdRng::from_entropy(),
            }),
            state: RwLock::new(TunnelConnectionState::Idle),
            status: RwLock::new(TunnelStatus::default()),
            halted: AtomicBool::new(false),
            disconnecting: AtomicBool::new(false),
            cancel: Notify::new(),
            events: EventBus::new(),
            monitor: Mutex::new(None),
        }
    }

    /// Supervisor using the system's client binary, interfaces and network
    pub fn from_config(config: TunnelConfig) -> Self {
        let launcher = Arc::new(ClientLauncher::new(&config));
        let interfaces = Arc::new(SystemInterfaceProbe::new(config.interface_keywords.clone()));
        Self::new(config, launcher, interfaces, Arc::new(TcpReachability))
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Bring the tunnel up.
    ///
    /// Clears a reconnect halt and the reconnect counter. Returns the
    /// connected status, which is also published.
    pub async fn connect(&self) -> TunnelResult<TunnelStatus> {
        let mut inner = self.inner.lock().await;
        if self.halted.swap(false, Ordering::SeqCst) {
            info!("Explicit connect, automatic reconnects re-enabled");
        }
        inner.reconnect.reset();
        self.connect_locked(&mut inner).await
    }

    async fn connect_locked(&self, inner: &mut SupervisorInner) -> TunnelResult<TunnelStatus> {
        if inner.mode == Some(TunnelMode::Simulated) {
            return Ok(self.status());
        }
        if self.config.simulate {
            return Ok(self.simulate(inner));
        }

        // Already up, either ours or started outside the agent
        if let Some(interface) = self.interfaces.detect() {
            let mode = if inner.process.is_some() {
                TunnelMode::Managed
            } else {
                TunnelMode::External
            };
            return Ok(self.link_up(inner, mode, interface).await);
        }

        self.set_state(TunnelConnectionState::Connecting);

        match self.start_client(inner).await {
            Ok(interface) => Ok(self.link_up(inner, TunnelMode::Managed, interface).await),
            Err(Failure::Simulate(reason)) => {
                info!(reason = %reason, "Using simulated tunnel");
                Ok(self.simulate(inner))
            }
            Err(Failure::Fail(e)) => {
                warn!(error = %e, "Tunnel connect failed");
                inner.mode = None;
                inner.interface = None;
                self.set_state(TunnelConnectionState::Disconnected);
                self.publish_status(TunnelStatus::disconnected(Some(e.to_string())));
                Err(e)
            }
        }
    }

    /// Validate the artifact, launch the client and wait for its interface
    async fn start_client(&self, inner: &mut SupervisorInner) -> Result<TunnelInterface, Failure> {
        let fallback = self.config.fallback;
        let unavailable = |e: TunnelError| match fallback {
            FallbackPolicy::Never => Failure::Fail(e),
            FallbackPolicy::ClientUnavailable | FallbackPolicy::Always => Failure::Simulate(e),
        };
        let failed = |e: TunnelError| match fallback {
            FallbackPolicy::Always => Failure::Simulate(e),
            _ => Failure::Fail(e),
        };

        let config_path = match ensure_artifact(&self.config.config_path)
            .await
            .map_err(Failure::Fail)?
        {
            ArtifactStatus::Ready(path) => path,
            ArtifactStatus::Template { path, .. } => {
                return Err(unavailable(TunnelError::NotConfigured(path)))
            }
        };

        if !self.launcher.is_available() {
            return Err(unavailable(TunnelError::ClientUnavailable(format!(
                "'{}' not found",
                self.config.client_binary
            ))));
        }

        // A leftover process from an earlier attempt is replaced
        if let Some(old) = inner.process.take() {
            self.stop_process(old).await;
        }

        let process = self.launcher.launch(&config_path).await.map_err(failed)?;
        inner.process = Some(process);

        match self.wait_for_interface(inner).await {
            Ok(interface) => Ok(interface),
            Err(e) => {
                if let Some(process) = inner.process.take() {
                    self.stop_process(process).await;
                }
                match e {
                    TunnelError::Cancelled => Err(Failure::Fail(e)),
                    e => Err(failed(e)),
                }
            }
        }
    }

    /// Poll for the tunnel interface until the connect timeout.
    ///
    /// An early exit of the client ends the wait immediately.
    async fn wait_for_interface(
        &self,
        inner: &mut SupervisorInner,
    ) -> TunnelResult<TunnelInterface> {
        let timeout = self.config.connect_timeout();
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(process) = inner.process.as_mut() {
                if let ProcessState::Exited(code) = process.state() {
                    return Err(TunnelError::ProcessExited { code });
                }
            }
            if let Some(interface) = self.interfaces.detect() {
                return Ok(interface);
            }
            if Instant::now() >= deadline {
                return Err(TunnelError::DetectionTimeout(timeout));
            }
            if !self.pause(DETECTION_POLL).await {
                return Err(TunnelError::Cancelled);
            }
        }
    }

    async fn link_up(
        &self,
        inner: &mut SupervisorInner,
        mode: TunnelMode,
        interface: TunnelInterface,
    ) -> TunnelStatus {
        let latency_ms = self.probe_latency().await;
        info!(%interface, ?mode, latency_ms, "Tunnel connected");

        let status = TunnelStatus::connected(
            mode,
            Some(interface.name.clone()),
            interface.address,
            latency_ms,
        );
        inner.mode = Some(mode);
        inner.interface = Some(interface);
        inner.reconnect.reset();
        self.set_state(TunnelConnectionState::Connected);
        self.publish_status(status.clone());
        status
    }

    fn simulate(&self, inner: &mut SupervisorInner) -> TunnelStatus {
        let address = *inner
            .simulated_address
            .get_or_insert_with(|| Ipv4Addr::new(10, 8, 0, inner.rng.gen_range(2..=254)));
        let status = TunnelStatus::connected(
            TunnelMode::Simulated,
            None,
            address,
            synthetic_latency(&mut inner.rng),
        );
        inner.mode = Some(TunnelMode::Simulated);
        inner.interface = None;
        inner.reconnect.reset();
        self.set_state(TunnelConnectionState::Connected);
        self.publish_status(status.clone());
        status
    }

    // =========================================================================
    // Status checks and reconnect
    // =========================================================================

    /// Re-run detection and recover a lost link.
    ///
    /// On a loss of a connected link the reconnect policy runs: wait, try
    /// again, count failures, up to the configured maximum. Reaching the
    /// maximum halts automatic reconnects until [`connect`](Self::connect).
    pub async fn check_status(&self) -> TunnelStatus {
        if self.disconnecting.load(Ordering::SeqCst) {
            return self.status();
        }
        let Ok(mut inner) = self.inner.try_lock() else {
            debug!("Tunnel supervisor busy, skipping status check");
            return self.status();
        };

        match inner.mode {
            None => return self.status(),
            Some(TunnelMode::Simulated) => {
                let mut status = self.status();
                status.latency_ms = synthetic_latency(&mut inner.rng);
                self.publish_status(status.clone());
                return status;
            }
            Some(_) => {}
        }

        let process_exited = inner
            .process
            .as_mut()
            .is_some_and(|p| matches!(p.state(), ProcessState::Exited(_)));

        if !process_exited {
            if let Some(interface) = self.interfaces.detect() {
                let latency_ms = self.probe_latency().await;
                let mode = inner.mode.unwrap_or(TunnelMode::External);
                let status = TunnelStatus::connected(
                    mode,
                    Some(interface.name.clone()),
                    interface.address,
                    latency_ms,
                );
                inner.interface = Some(interface);
                self.set_state(if status.has_latency() {
                    TunnelConnectionState::Connected
                } else {
                    TunnelConnectionState::Degraded
                });
                self.publish_status(status.clone());
                return status;
            }
        }

        warn!(process_exited, "Tunnel link lost");
        if let Some(process) = inner.process.take() {
            self.stop_process(process).await;
        }
        inner.mode = None;
        inner.interface = None;
        self.set_state(TunnelConnectionState::Degraded);
        self.publish_status(TunnelStatus::disconnected(Some("tunnel link lost".to_string())));

        self.reconnect(&mut inner).await
    }

    async fn reconnect(&self, inner: &mut SupervisorInner) -> TunnelStatus {
        if self.halted.load(Ordering::SeqCst) {
            self.set_state(TunnelConnectionState::Disconnected);
            return self.status();
        }

        let max_attempts = inner.reconnect.max_attempts();
        while !inner.reconnect.is_exhausted() {
            if self.disconnecting.load(Ordering::SeqCst) {
                debug!("Disconnect requested, reconnect abandoned");
                return self.status();
            }
            let attempt = inner.reconnect.attempts() + 1;
            self.set_state(TunnelConnectionState::Reconnecting);
            self.events.publish(TunnelEvent::ReconnectAttempt {
                attempt,
                max_attempts,
            });
            info!(attempt, max_attempts, "Reconnecting tunnel");

            if !self.pause(self.config.reconnect.delay()).await {
                debug!("Disconnect requested, reconnect abandoned");
                return self.status();
            }

            match self.connect_locked(inner).await {
                Ok(status) => return status,
                Err(TunnelError::Cancelled) => return self.status(),
                Err(e) => {
                    let attempts = inner.reconnect.record_failure();
                    warn!(attempt = attempts, max_attempts, error = %e, "Reconnect failed");
                }
            }
        }

        let attempts = inner.reconnect.attempts();
        warn!(attempts, "Reconnect attempts exhausted, waiting for explicit connect");
        self.halted.store(true, Ordering::SeqCst);
        self.events.publish(TunnelEvent::ReconnectExhausted { attempts });
        self.set_state(TunnelConnectionState::Disconnected);
        self.status()
    }

    /// Sleep for `delay`. Returns false when a disconnect was requested
    /// before or during the wait.
    async fn pause(&self, delay: Duration) -> bool {
        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();
        if self.disconnecting.load(Ordering::SeqCst) {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancelled => false,
        }
    }

    /// Average round trip to the configured endpoints, or the unavailable
    /// sentinel. Synthetic while simulating.
    pub async fn measure_latency(&self) -> f64 {
        {
            let mut inner = self.inner.lock().await;
            if inner.mode == Some(TunnelMode::Simulated) {
                return synthetic_latency(&mut inner.rng);
            }
        }
        self.probe_latency().await
    }

    async fn probe_latency(&self) -> f64 {
        measure_latency(
            self.reachability.as_ref(),
            &self.config.latency_endpoints,
            self.config.probe_timeout(),
        )
        .await
    }

    // =========================================================================
    // Disconnect
    // =========================================================================

    /// Stop the managed client and clear all link state.
    ///
    /// Safe to call repeatedly; every call publishes a disconnected status.
    /// A reconnect loop or connect in progress is abandoned at its next wait.
    pub async fn disconnect(&self) {
        self.disconnecting.store(true, Ordering::SeqCst);
        self.cancel.notify_waiters();

        let mut inner = self.inner.lock().await;
        if let Some(process) = inner.process.take() {
            self.stop_process(process).await;
        }
        inner.mode = None;
        inner.interface = None;
        inner.simulated_address = None;
        self.set_state(TunnelConnectionState::Disconnected);
        self.publish_status(TunnelStatus::disconnected(None));
        self.disconnecting.store(false, Ordering::SeqCst);
    }

    /// Graceful close through the management port, then kill
    async fn stop_process(&self, mut process: Box<dyn ManagedProcess>) {
        if let ProcessState::Exited(code) = process.state() {
            debug!(?code, "Tunnel client already exited");
            return;
        }

        if process.request_close().await {
            let deadline = Instant::now() + self.config.graceful_stop();
            while Instant::now() < deadline {
                if let ProcessState::Exited(code) = process.state() {
                    info!(?code, "Tunnel client stopped");
                    return;
                }
                tokio::time::sleep(STOP_POLL).await;
            }
        }

        warn!(pid = process.id(), "Tunnel client did not stop gracefully, killing");
        process.kill().await;
    }

    // =========================================================================
    // Snapshots and monitoring
    // =========================================================================

    pub fn state(&self) -> TunnelConnectionState {
        *self.state.read()
    }

    /// Most recently published status
    pub fn status(&self) -> TunnelStatus {
        self.status.read().clone()
    }

    /// Whether automatic reconnects stopped after reaching the cap
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event<TunnelEvent>> {
        self.events.subscribe()
    }

    fn set_state(&self, to: TunnelConnectionState) {
        let from = std::mem::replace(&mut *self.state.write(), to);
        if from != to {
            debug!(?from, ?to, "Tunnel state changed");
            self.events.publish(TunnelEvent::StateChanged { from, to });
        }
    }

    fn publish_status(&self, status: TunnelStatus) {
        *self.status.write() = status.clone();
        self.events.publish(TunnelEvent::Status(status));
    }

    /// Run [`check_status`](Self::check_status) every `interval`
    pub async fn start_monitoring(self: &Arc<Self>, interval: Duration) {
        self.stop_monitoring().await;

        let supervisor: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; connect already checked
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(supervisor) = supervisor.upgrade() else {
                    break;
                };
                supervisor.check_status().await;
            }
        });

        *self.monitor.lock().await = Some(handle);
        debug!(interval_secs = interval.as_secs(), "Tunnel monitoring started");
    }

    pub async fn stop_monitoring(&self) {
        if let Some(handle) = self.monitor.lock().await.take() {
            handle.abort();
            debug!("Tunnel monitoring stopped");
        }
    }
}

impl Drop for TunnelSupervisor {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor.get_mut().take() {
            handle.abort();
        }
    }
}

/// Plausible latency for a simulated link, one decimal place
fn synthetic_latency(rng: &mut StdRng) -> f64 {
    f64::from(rng.gen_range(150..=800)) / 10.0
}
