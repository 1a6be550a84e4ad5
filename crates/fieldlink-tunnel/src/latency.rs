//! Link quality probes

use std::time::Duration;

use async_trait::async_trait;
use fieldlink_core::LATENCY_UNAVAILABLE;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

/// Measures the round trip to one endpoint
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Round-trip time, or `None` when the endpoint did not answer in time
    async fn probe(&self, endpoint: &str, timeout: Duration) -> Option<Duration>;
}

/// Times a TCP handshake to the endpoint (one round trip, no raw sockets)
#[derive(Debug, Default)]
pub struct TcpReachability;

#[async_trait]
impl ReachabilityProbe for TcpReachability {
    async fn probe(&self, endpoint: &str, timeout: Duration) -> Option<Duration> {
        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect(endpoint)).await {
            Ok(Ok(_stream)) => Some(started.elapsed()),
            Ok(Err(e)) => {
                debug!(%endpoint, error = %e, "Latency probe failed");
                None
            }
            Err(_) => {
                debug!(%endpoint, "Latency probe timed out");
                None
            }
        }
    }
}

/// Average round trip of the endpoints that answered, in milliseconds.
///
/// Endpoints are probed concurrently. Returns [`LATENCY_UNAVAILABLE`] when
/// none answered.
pub async fn measure_latency(
    probe: &dyn ReachabilityProbe,
    endpoints: &[String],
    timeout: Duration,
) -> f64 {
    let results =
        futures::future::join_all(endpoints.iter().map(|e| probe.probe(e, timeout))).await;
    let successes: Vec<Duration> = results.into_iter().flatten().collect();

    if successes.is_empty() {
        return LATENCY_UNAVAILABLE;
    }
    let total: f64 = successes.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
    let average = total / successes.len() as f64;
    (average * 10.0).round() / 10.0
}
