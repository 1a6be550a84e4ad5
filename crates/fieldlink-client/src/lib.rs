//! fieldlink collector client
//!
//! Typed HTTP client for the collector that persists telemetry sessions
//! and samples. [`CollectorClient`] implements
//! [`fieldlink_core::CollectorApi`], so the agent only depends on the trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use fieldlink_client::CollectorClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CollectorClient::new("http://localhost:8080")?;
//!
//!     let session = client
//!         .open_session("field-unit-01", "ELM327", "ISO 15765-4 (CAN 11/500)")
//!         .await?;
//!     client.close_session(&session).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Wire format
//!
//! | call | request | success |
//! |------|---------|---------|
//! | create session | `POST /api/sessions` `{clientId, adapterType, protocolName}` | `{"id": "..."}` |
//! | create sample | `POST /api/samples` [`SampleRecord`](fieldlink_core::SampleRecord) | any 2xx |
//! | end session | `POST /api/sessions/{id}/end` | any 2xx |
//!
//! Errors carry `{"error": "..."}`; a 404 means the session is unknown.

mod client;
pub mod config;
mod error;
pub mod testing;
mod types;

pub use client::CollectorClient;
pub use config::CollectorConfig;
pub use error::{ClientError, Result};
pub use types::*;

// Re-export core types for convenience
pub use fieldlink_core::{CollectorApi, CollectorError, SampleRecord, SessionId};
