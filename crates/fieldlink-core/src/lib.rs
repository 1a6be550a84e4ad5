//! fieldlink-core - Core types and traits for the fieldlink telemetry agent
//!
//! This crate holds everything the device-connectivity engines and their
//! consumers agree on: the vehicle and tunnel data model, the timestamped
//! event bus both engines publish on, and the interface of the remote
//! collector that receives telemetry.

pub mod collector;
pub mod error;
pub mod events;
pub mod models;

pub use collector::{CollectorApi, SampleRecord, SessionId};
pub use error::{CollectorError, CollectorResult};
pub use events::{Event, EventBus};
pub use models::*;
