//! Telemetry emitter
//!
//! Runs on its own timer, independent of the engines' timers. Each tick
//! looks at the latest vehicle sample and forwards it to the collector,
//! at most once per sample and no more often than the minimum send
//! interval. Failed sends are logged and leave the emitter state alone,
//! so the next tick tries again.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fieldlink_core::{CollectorApi, SampleRecord};
use fieldlink_obd::VehicleLinkEngine;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::session::CollectorSession;

/// What one emitter tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Sent,
    /// The engine has no sample yet
    NoSample,
    /// The latest sample was already sent
    Duplicate,
    /// Too soon after the previous send
    Throttled,
    /// No collector session could be opened
    NoSession,
    /// The collector call failed
    Failed,
}

#[derive(Default)]
struct EmitterState {
    last_sent: Option<Instant>,
    last_sampled_at: Option<DateTime<Utc>>,
}

/// Forwards vehicle samples to the collector
pub struct TelemetryEmitter {
    engine: Arc<VehicleLinkEngine>,
    session: Arc<CollectorSession>,
    collector: Arc<dyn CollectorApi>,
    min_send_interval: Duration,
    state: Mutex<EmitterState>,
    ticker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryEmitter {
    pub fn new(
        engine: Arc<VehicleLinkEngine>,
        session: Arc<CollectorSession>,
        collector: Arc<dyn CollectorApi>,
        min_send_interval: Duration,
    ) -> Self {
        Self {
            engine,
            session,
            collector,
            min_send_interval,
            state: Mutex::new(EmitterState::default()),
            ticker: tokio::sync::Mutex::new(None),
        }
    }

    /// Forward the latest sample if it is new and the throttle allows it
    pub async fn tick(&self) -> EmitOutcome {
        let Some(sample) = self.engine.latest_sample() else {
            return EmitOutcome::NoSample;
        };

        {
            let state = self.state.lock();
            if state.last_sampled_at == Some(sample.sampled_at) {
                return EmitOutcome::Duplicate;
            }
            if state
                .last_sent
                .is_some_and(|sent| sent.elapsed() < self.min_send_interval)
            {
                return EmitOutcome::Throttled;
            }
        }

        let Some(session_id) = self.session.ensure().await else {
            debug!("No collector session, sample not sent");
            return EmitOutcome::NoSession;
        };

        let record = SampleRecord::from_sample(session_id, &sample);
        match self.collector.create_sample(&record).await {
            Ok(()) => {
                let mut state = self.state.lock();
                state.last_sent = Some(Instant::now());
                state.last_sampled_at = Some(sample.sampled_at);
                debug!(session_id = %record.session_id, "Sample sent");
                EmitOutcome::Sent
            }
            Err(e) => {
                warn!(error = %e, "Failed to send sample");
                EmitOutcome::Failed
            }
        }
    }

    /// Tick every `interval` until stopped or the emitter is dropped
    pub async fn start(self: &Arc<Self>, interval: Duration) {
        self.stop().await;

        let emitter: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(emitter) = emitter.upgrade() else {
                    break;
                };
                emitter.tick().await;
            }
        });

        *self.ticker.lock().await = Some(handle);
        debug!(interval_ms = interval.as_millis() as u64, "Telemetry emitter started");
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
            debug!("Telemetry emitter stopped");
        }
    }
}

impl Drop for TelemetryEmitter {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
    }
}
