//! Request and response bodies of the collector REST API

use fieldlink_core::SessionId;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/sessions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub client_id: String,
    pub adapter_type: String,
    pub protocol_name: String,
}

/// Response of `POST /api/sessions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: SessionId,
}

/// Error body returned by the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
