use serde::{Deserialize, Serialize};

use crate::models::SearchResults;
use crate::services::MetricsSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Shutdown,
    Status,
    AddDocuments(AddDocumentsRequest),
    Search(SearchRequest),
}

/// Payload of an add request. `documents` stays a raw JSON value so the
/// pipeline can report "documents must be an array" instead of a generic
/// decode failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddDocumentsRequest {
    pub documents: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    ShutdownAck,
    Status(StatusResponse),
    Added(AddedResponse),
    Search(SearchResults),
    Error(ErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub embedding_model: String,
    pub model_ready: bool,
    pub store: StoreStatus,
    pub idle_secs: u64,
    pub requests_served: u64,
    pub metrics: Option<MetricsSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatus {
    pub driver: String,
    pub url: String,
    pub collection: String,
    pub connected: bool,
    pub points_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedResponse {
    pub success: bool,
    pub added: u64,
}

/// Failure class of an error response: the wire-level stand-in for a 4xx/5xx
/// status split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Embedding,
    Store,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse {
            kind,
            message: message.into(),
        })
    }
}

pub fn encode_message(msg: &impl Serialize) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = (json.len() as u32).to_be_bytes();
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len);
    buf.extend_from_slice(&json);
    Ok(buf)
}

pub fn decode_length(buf: &[u8; 4]) -> usize {
    u32::from_be_bytes(*buf) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_request_keeps_raw_documents_value() {
        // A bare string must survive decoding so validation can reject it
        // with the right message instead of a protocol error.
        let raw = json!({"type": "add_documents", "documents": "not-an-array"});
        let request: Request = serde_json::from_value(raw).unwrap();
        match request {
            Request::AddDocuments(req) => assert!(req.documents.is_string()),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_search_request_q_is_optional() {
        let raw = json!({"type": "search"});
        let request: Request = serde_json::from_value(raw).unwrap();
        match request {
            Request::Search(req) => assert!(req.q.is_none()),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_error_kind_wire_names() {
        let resp = Response::error(ErrorKind::Validation, "documents must be an array");
        let encoded = serde_json::to_value(&resp).unwrap();
        assert_eq!(encoded["kind"], "validation");
    }
}
