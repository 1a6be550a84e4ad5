//! Agent wiring
//!
//! Owns the two engines, the collector session and the emitter, and runs
//! each on its own timer. A watcher task follows vehicle link events and
//! recovers the link (with a fresh collector session) after communication
//! is lost.

use std::sync::Arc;

use anyhow::Context;
use fieldlink_client::CollectorClient;
use fieldlink_core::{CollectorApi, VehicleEvent};
use fieldlink_obd::VehicleLinkEngine;
use fieldlink_tunnel::TunnelSupervisor;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::emitter::TelemetryEmitter;
use crate::session::CollectorSession;

/// Protocol reported to the collector when the link has none
const UNKNOWN_PROTOCOL: &str = "Unknown";

/// The running telemetry agent
pub struct Agent {
    config: AgentConfig,
    engine: Arc<VehicleLinkEngine>,
    tunnel: Arc<TunnelSupervisor>,
    session: Arc<CollectorSession>,
    emitter: Arc<TelemetryEmitter>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        engine: Arc<VehicleLinkEngine>,
        tunnel: Arc<TunnelSupervisor>,
        collector: Arc<dyn CollectorApi>,
    ) -> Self {
        let session = Arc::new(CollectorSession::new(
            collector.clone(),
            config.client_id.clone(),
        ));
        let emitter = Arc::new(TelemetryEmitter::new(
            engine.clone(),
            session.clone(),
            collector,
            config.emitter.min_send_interval(),
        ));
        Self {
            config,
            engine,
            tunnel,
            session,
            emitter,
            watcher: Mutex::new(None),
        }
    }

    /// Build the engines and collector client named in `config`
    pub fn from_config(config: AgentConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let engine = VehicleLinkEngine::from_config(config.obd.clone())
            .context("Failed to create vehicle link")?;
        let tunnel = TunnelSupervisor::from_config(config.tunnel.clone());
        let collector = CollectorClient::from_config(&config.collector)
            .context("Failed to create collector client")?;
        Ok(Self::new(
            config,
            Arc::new(engine),
            Arc::new(tunnel),
            Arc::new(collector),
        ))
    }

    /// Connect both engines and start all timers.
    ///
    /// A tunnel that cannot be brought up is logged, not fatal.
    pub async fn start(&self) -> anyhow::Result<()> {
        let mode = self
            .engine
            .connect()
            .await
            .context("Failed to connect vehicle link")?;
        let protocol = self.protocol_name().await;
        self.session.open(mode, &protocol).await;

        self.spawn_watcher().await;
        self.engine.start_polling(self.config.poll_interval()).await;

        match self.tunnel.connect().await {
            Ok(status) => info!(
                mode = ?status.mode,
                address = ?status.local_address,
                latency_ms = status.latency_ms,
                "Tunnel up"
            ),
            Err(e) => warn!(error = %e, "Tunnel not connected"),
        }
        self.tunnel
            .start_monitoring(self.config.heartbeat_interval())
            .await;

        self.emitter
            .start(self.config.emitter.tick_interval())
            .await;

        info!(
            client_id = %self.config.client_id,
            vehicle = mode.adapter_type(),
            "Agent started"
        );
        Ok(())
    }

    /// Stop all timers, end the collector session and disconnect both engines
    pub async fn shutdown(&self) {
        self.emitter.stop().await;
        if let Some(handle) = self.watcher.lock().await.take() {
            handle.abort();
        }
        self.engine.stop_polling().await;
        self.tunnel.stop_monitoring().await;

        self.session.close().await;
        self.engine.disconnect().await;
        self.tunnel.disconnect().await;
        info!("Agent stopped");
    }

    pub fn engine(&self) -> &Arc<VehicleLinkEngine> {
        &self.engine
    }

    pub fn tunnel(&self) -> &Arc<TunnelSupervisor> {
        &self.tunnel
    }

    pub fn session(&self) -> &Arc<CollectorSession> {
        &self.session
    }

    async fn protocol_name(&self) -> String {
        self.engine
            .protocol_name()
            .await
            .unwrap_or_else(|| UNKNOWN_PROTOCOL.to_string())
    }

    async fn spawn_watcher(&self) {
        let mut events = self.engine.subscribe();
        let engine = self.engine.clone();
        let session = self.session.clone();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let VehicleEvent::CommunicationLost { consecutive_errors } =
                            event.payload()
                        {
                            warn!(consecutive_errors, "Vehicle link lost, reconnecting");
                            recover_link(&engine, &session).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Vehicle event watcher lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(old) = self.watcher.lock().await.replace(handle) {
            old.abort();
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.get_mut().take() {
            handle.abort();
        }
    }
}

/// End the old session, reconnect and open a session for the new link
async fn recover_link(engine: &VehicleLinkEngine, session: &CollectorSession) {
    session.close().await;
    match engine.reconnect().await {
        Ok(mode) => {
            let protocol = engine
                .protocol_name()
                .await
                .unwrap_or_else(|| UNKNOWN_PROTOCOL.to_string());
            info!(vehicle = mode.adapter_type(), "Vehicle link recovered");
            session.open(mode, &protocol).await;
        }
        Err(e) => warn!(error = %e, "Vehicle link reconnect failed"),
    }
}
