//! Vehicle link engine
//!
//! Owns the data source for the lifetime of a connection and serializes all
//! access to it. Periodic polling never waits for the source: when another
//! operation holds it, the tick is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use fieldlink_core::{
    Event, EventBus, LinkMode, LinkState, VehicleEvent, VehicleIdentity, VehicleSample,
};
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ObdConfig;
use crate::discovery::AdapterDiscovery;
use crate::error::{LinkError, LinkResult};
use crate::protocol::ErrorCounter;
use crate::source::{HardwareSource, SimulatedSource, VehicleDataSource, VehicleSource};
use crate::transport::{create_opener, TransportOpener};

#[derive(Default)]
struct EngineInner {
    source: Option<VehicleSource>,
    /// First successfully read identity of the current session
    identity: Option<VehicleIdentity>,
}

/// Connects to a vehicle (or simulates one) and produces samples
pub struct VehicleLinkEngine {
    config: ObdConfig,
    discovery: AdapterDiscovery,
    inner: Mutex<EngineInner>,
    state: RwLock<LinkState>,
    latest: RwLock<Option<VehicleSample>>,
    errors: Arc<ErrorCounter>,
    disconnecting: AtomicBool,
    events: EventBus<VehicleEvent>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl VehicleLinkEngine {
    pub fn new(config: ObdConfig, opener: Arc<dyn TransportOpener>) -> Self {
        let discovery =
            AdapterDiscovery::new(opener, config.discovery.clone(), config.channel.clone());
        Self {
            config,
            discovery,
            inner: Mutex::new(EngineInner::default()),
            state: RwLock::new(LinkState::Disconnected),
            latest: RwLock::new(None),
            errors: Arc::new(ErrorCounter::new()),
            disconnecting: AtomicBool::new(false),
            events: EventBus::new(),
            poller: Mutex::new(None),
        }
    }

    /// Create an engine with the transport named in `config`
    pub fn from_config(config: ObdConfig) -> LinkResult<Self> {
        let opener = create_opener(&config.transport, &config.discovery)?;
        Ok(Self::new(config, opener))
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Discover an adapter, falling back to simulated data when none answers.
    ///
    /// The data source is chosen here, once per connection, and the vehicle
    /// identity is read right after initialization. Connecting an already
    /// connected engine returns the current mode.
    pub async fn connect(&self) -> LinkResult<LinkMode> {
        if self.disconnecting.load(Ordering::SeqCst) {
            return Err(LinkError::DisconnectInProgress);
        }

        let mut inner = self.inner.lock().await;
        if let Some(source) = &inner.source {
            return Ok(source.mode());
        }

        self.set_state(LinkState::Connecting);
        self.errors.reset();
        inner.identity = None;

        let mut source = match self.discovery.discover(self.errors.clone()).await {
            Ok(mut session) => {
                session.initialize().await;
                let candidate = session.candidate().clone();
                self.events.publish(VehicleEvent::AdapterDetected {
                    port: candidate.port,
                    baud_rate: candidate.baud_rate,
                    protocol: session.protocol_name().to_string(),
                });
                VehicleSource::Hardware(HardwareSource::new(session))
            }
            Err(e) => {
                warn!(error = %e, "Using simulated vehicle data");
                VehicleSource::Simulated(SimulatedSource::new(&self.config.simulation))
            }
        };

        // Cached for the session; polls retry a failed read
        let identity = source.read_identity().await;
        if identity.is_known() {
            inner.identity = Some(identity);
        }

        // Setup chatter does not count against the new session
        self.errors.reset();
        let mode = source.mode();
        info!(
            mode = mode.adapter_type(),
            protocol = %source.protocol_name(),
            "Vehicle link connected"
        );
        inner.source = Some(source);
        self.set_state(state_for(mode));
        Ok(mode)
    }

    /// Close the data source. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        self.disconnecting.store(true, Ordering::SeqCst);

        let mut inner = self.inner.lock().await;
        if let Some(mut source) = inner.source.take() {
            source.close().await;
            info!("Vehicle link disconnected");
        }
        inner.identity = None;
        *self.latest.write() = None;
        self.set_state(LinkState::Disconnected);

        self.disconnecting.store(false, Ordering::SeqCst);
    }

    /// Disconnect, then connect with fresh error counters
    pub async fn reconnect(&self) -> LinkResult<LinkMode> {
        self.disconnect().await;
        self.connect().await
    }

    // =========================================================================
    // Readings
    // =========================================================================

    /// Take one sample of every reading.
    ///
    /// Returns `None` without touching the source when a disconnect is in
    /// progress, another operation holds the source, no source is active, or
    /// the consecutive error threshold has been reached.
    pub async fn poll(&self) -> Option<VehicleSample> {
        if self.disconnecting.load(Ordering::SeqCst) {
            debug!("Disconnect in progress, skipping poll");
            return None;
        }
        let Ok(mut guard) = self.inner.try_lock() else {
            debug!("Vehicle link busy, skipping poll");
            return None;
        };
        if self.errors.get() >= self.config.error_threshold {
            self.close_after_errors(&mut guard).await;
            return None;
        }

        let inner = &mut *guard;
        let source = inner.source.as_mut()?;

        let identity = match &inner.identity {
            Some(identity) => identity.clone(),
            None => {
                let identity = source.read_identity().await;
                if identity.is_known() {
                    inner.identity = Some(identity.clone());
                }
                identity
            }
        };
        let battery_voltage = source.read_voltage().await;
        let (ignition_on, engine_speed_rpm) = source.read_ignition_and_speed().await;
        let mode = source.mode();

        if self.close_after_errors(inner).await {
            return None;
        }

        let sample = VehicleSample {
            identity,
            battery_voltage,
            ignition_on,
            engine_speed_rpm,
            mode,
            sampled_at: Utc::now(),
        };
        debug!(sample = %sample.raw_debug(), "Vehicle sampled");
        *self.latest.write() = Some(sample.clone());
        self.events.publish(VehicleEvent::Sample(sample.clone()));
        Some(sample)
    }

    /// Vehicle identity, or the read-failed sentinel
    pub async fn read_identity(&self) -> VehicleIdentity {
        if self.disconnecting.load(Ordering::SeqCst) {
            return VehicleIdentity::ReadFailed;
        }
        let mut inner = self.inner.lock().await;
        if let Some(identity) = &inner.identity {
            return identity.clone();
        }
        let Some(source) = inner.source.as_mut() else {
            return VehicleIdentity::ReadFailed;
        };
        let identity = source.read_identity().await;
        if identity.is_known() {
            inner.identity = Some(identity.clone());
        }
        self.close_after_errors(&mut inner).await;
        identity
    }

    /// Battery voltage in volts
    pub async fn read_voltage(&self) -> Option<f64> {
        if self.disconnecting.load(Ordering::SeqCst) {
            return None;
        }
        let mut inner = self.inner.lock().await;
        let volts = inner.source.as_mut()?.read_voltage().await;
        self.close_after_errors(&mut inner).await;
        volts
    }

    pub async fn read_engine_speed(&self) -> Option<u32> {
        if self.disconnecting.load(Ordering::SeqCst) {
            return None;
        }
        let mut inner = self.inner.lock().await;
        let rpm = inner.source.as_mut()?.read_engine_speed().await;
        self.close_after_errors(&mut inner).await;
        rpm
    }

    pub async fn is_ignition_on(&self) -> Option<bool> {
        if self.disconnecting.load(Ordering::SeqCst) {
            return None;
        }
        let mut inner = self.inner.lock().await;
        let ignition = inner.source.as_mut()?.is_ignition_on().await;
        self.close_after_errors(&mut inner).await;
        ignition
    }

    /// Close the source once the error threshold is reached. Returns
    /// whether the threshold has been reached.
    async fn close_after_errors(&self, inner: &mut EngineInner) -> bool {
        let consecutive_errors = self.errors.get();
        if consecutive_errors < self.config.error_threshold {
            return false;
        }

        if let Some(mut source) = inner.source.take() {
            warn!(
                consecutive_errors,
                threshold = self.config.error_threshold,
                "Vehicle communication lost, closing session"
            );
            source.close().await;
            inner.identity = None;
            *self.latest.write() = None;
            self.events
                .publish(VehicleEvent::CommunicationLost { consecutive_errors });
            self.set_state(LinkState::Disconnected);
        }
        true
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn state(&self) -> LinkState {
        *self.state.read()
    }

    /// Mode of the active source
    pub fn mode(&self) -> Option<LinkMode> {
        match self.state() {
            LinkState::Hardware => Some(LinkMode::Hardware),
            LinkState::Simulated => Some(LinkMode::Simulated),
            _ => None,
        }
    }

    /// Protocol of the active source
    pub async fn protocol_name(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.source.as_ref().map(|s| s.protocol_name().to_string())
    }

    /// Most recent sample of the current session
    pub fn latest_sample(&self) -> Option<VehicleSample> {
        self.latest.read().clone()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.errors.get()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event<VehicleEvent>> {
        self.events.subscribe()
    }

    fn set_state(&self, to: LinkState) {
        let from = std::mem::replace(&mut *self.state.write(), to);
        if from != to {
            debug!(?from, ?to, "Vehicle link state changed");
            self.events.publish(VehicleEvent::StateChanged { from, to });
        }
    }

    // =========================================================================
    // Periodic polling
    // =========================================================================

    /// Poll every `interval` until stopped or the engine is dropped
    pub async fn start_polling(self: &Arc<Self>, interval: Duration) {
        self.stop_polling().await;

        let engine: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.poll().await;
            }
        });

        *self.poller.lock().await = Some(handle);
        debug!(interval_ms = interval.as_millis() as u64, "Vehicle polling started");
    }

    pub async fn stop_polling(&self) {
        if let Some(handle) = self.poller.lock().await.take() {
            handle.abort();
            debug!("Vehicle polling stopped");
        }
    }
}

impl Drop for VehicleLinkEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
    }
}

fn state_for(mode: LinkMode) -> LinkState {
    match mode {
        LinkMode::Hardware => LinkState::Hardware,
        LinkMode::Simulated => LinkState::Simulated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockOpener;

    #[tokio::test(start_paused = true)]
    async fn test_poll_without_connection_is_skipped() {
        let engine = VehicleLinkEngine::new(ObdConfig::default(), Arc::new(MockOpener::no_ports()));
        assert_eq!(engine.poll().await, None);
        assert_eq!(engine.read_voltage().await, None);
        assert_eq!(engine.read_identity().await, VehicleIdentity::ReadFailed);
        assert_eq!(engine.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_source_skips_tick() {
        let engine = VehicleLinkEngine::new(ObdConfig::default(), Arc::new(MockOpener::no_ports()));
        engine.connect().await.unwrap();

        let _held = engine.inner.lock().await;
        assert_eq!(engine.poll().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_twice_keeps_source() {
        let engine = VehicleLinkEngine::new(ObdConfig::default(), Arc::new(MockOpener::no_ports()));
        let mut events = engine.subscribe();

        assert_eq!(engine.connect().await.unwrap(), LinkMode::Simulated);
        assert_eq!(engine.connect().await.unwrap(), LinkMode::Simulated);

        let mut transitions = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let VehicleEvent::StateChanged { to, .. } = event.payload() {
                transitions.push(*to);
            }
        }
        assert_eq!(transitions, vec![LinkState::Connecting, LinkState::Simulated]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_stops_when_engine_dropped() {
        let engine = Arc::new(VehicleLinkEngine::new(
            ObdConfig::default(),
            Arc::new(MockOpener::no_ports()),
        ));
        engine.connect().await.unwrap();
        engine.start_polling(Duration::from_millis(100)).await;

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(engine.latest_sample().is_some());

        let weak = Arc::downgrade(&engine);
        drop(engine);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(weak.upgrade().is_none());
    }
}
