//! Test utilities for fieldlink-client
//!
//! [`TestServer`] runs an axum router on an ephemeral port with a client
//! pointed at it. [`RecordingCollector`] is an in-memory [`CollectorApi`]
//! for tests that do not need HTTP at all.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fieldlink_core::{CollectorApi, CollectorError, CollectorResult, SampleRecord, SessionId};
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::{CollectorClient, Result};

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: CollectorClient,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve `router` and build a client for it
    pub async fn start(router: axum::Router) -> Result<Self> {
        Self::start_with_timeout(router, Duration::from_secs(5), Duration::from_secs(2)).await
    }

    /// Create a new test server with custom client timeouts
    pub async fn start_with_timeout(
        router: axum::Router,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        let client =
            CollectorClient::with_config(&format!("http://{}", addr), timeout, connect_timeout)?;

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// In-memory collector
// =============================================================================

/// One call received by a [`RecordingCollector`]
#[derive(Debug, Clone, PartialEq)]
pub enum CollectorCall {
    CreateSession {
        client_id: String,
        adapter_type: String,
        protocol_name: String,
    },
    CreateSample(SampleRecord),
    EndSession(SessionId),
}

/// Records every call; can be switched to fail them all.
///
/// Calls are recorded whether or not they fail. Session ids are
/// `session-1`, `session-2`, ...
#[derive(Default)]
pub struct RecordingCollector {
    calls: Mutex<Vec<CollectorCall>>,
    failing: AtomicBool,
    next_session: AtomicU32,
}

impl RecordingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<CollectorCall> {
        self.calls.lock().clone()
    }

    pub fn samples(&self) -> Vec<SampleRecord> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                CollectorCall::CreateSample(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn ended_sessions(&self) -> Vec<SessionId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                CollectorCall::EndSession(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: CollectorCall) -> CollectorResult<()> {
        self.calls.lock().push(call);
        if self.failing.load(Ordering::SeqCst) {
            Err(CollectorError::Unreachable("collector offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CollectorApi for RecordingCollector {
    async fn create_session(
        &self,
        client_id: &str,
        adapter_type: &str,
        protocol_name: &str,
    ) -> CollectorResult<SessionId> {
        self.record(CollectorCall::CreateSession {
            client_id: client_id.to_string(),
            adapter_type: adapter_type.to_string(),
            protocol_name: protocol_name.to_string(),
        })?;
        let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionId(format!("session-{}", n)))
    }

    async fn create_sample(&self, record: &SampleRecord) -> CollectorResult<()> {
        self.record(CollectorCall::CreateSample(record.clone()))
    }

    async fn end_session(&self, session_id: &SessionId) -> CollectorResult<()> {
        self.record(CollectorCall::EndSession(session_id.clone()))
    }
}
