//! Collector session lifecycle
//!
//! A session is opened when the vehicle link connects and ended when it
//! disconnects. Both calls are best effort: a failed open is retried the
//! next time a sample needs a session, a failed end is only logged.

use std::sync::Arc;

use fieldlink_core::{CollectorApi, LinkMode, SessionId};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Default)]
struct SessionState {
    /// Adapter type and protocol of the connected link
    link: Option<(LinkMode, String)>,
    id: Option<SessionId>,
}

/// Tracks the collector session of the current vehicle link
pub struct CollectorSession {
    collector: Arc<dyn CollectorApi>,
    client_id: String,
    state: Mutex<SessionState>,
}

impl CollectorSession {
    pub fn new(collector: Arc<dyn CollectorApi>, client_id: impl Into<String>) -> Self {
        Self {
            collector,
            client_id: client_id.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Start a session for a newly connected link, ending any previous one
    pub async fn open(&self, mode: LinkMode, protocol_name: &str) -> Option<SessionId> {
        let mut state = self.state.lock().await;
        self.end_locked(&mut state).await;
        state.link = Some((mode, protocol_name.to_string()));
        self.create_locked(&mut state).await
    }

    /// The current session, opening it now if an earlier attempt failed
    pub async fn ensure(&self) -> Option<SessionId> {
        let mut state = self.state.lock().await;
        if let Some(id) = &state.id {
            return Some(id.clone());
        }
        if state.link.is_none() {
            return None;
        }
        self.create_locked(&mut state).await
    }

    /// End the current session and forget the link
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        self.end_locked(&mut state).await;
        state.link = None;
    }

    pub async fn current(&self) -> Option<SessionId> {
        self.state.lock().await.id.clone()
    }

    async fn create_locked(&self, state: &mut SessionState) -> Option<SessionId> {
        let (mode, protocol_name) = state.link.as_ref()?;
        match self
            .collector
            .create_session(&self.client_id, mode.adapter_type(), protocol_name)
            .await
        {
            Ok(id) => {
                info!(
                    session_id = %id,
                    adapter = mode.adapter_type(),
                    protocol = %protocol_name,
                    "Collector session opened"
                );
                state.id = Some(id.clone());
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "Failed to open collector session");
                None
            }
        }
    }

    async fn end_locked(&self, state: &mut SessionState) {
        let Some(id) = state.id.take() else {
            return;
        };
        match self.collector.end_session(&id).await {
            Ok(()) => info!(session_id = %id, "Collector session ended"),
            Err(e) => warn!(session_id = %id, error = %e, "Failed to end collector session"),
        }
    }
}
