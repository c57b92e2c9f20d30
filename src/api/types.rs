//! Wire types for the relationship and presence APIs
//!
//! Responses are normalized here, once, at the boundary. The backend has
//! shipped several shapes for the same resources over time; each accepted
//! shape is listed explicitly and anything else is rejected with
//! [`SyncError::InvalidResponse`] instead of being read as an empty result.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /connections/requests`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequestBody {
    pub target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `POST /connections/accept`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequestBody {
    pub request_id: String,
}

/// Body of `PUT /presence/location`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    pub check_nearby: bool,
}

/// An outgoing pending request, normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    /// Backend request identifier
    pub id: String,
    /// The user the request was sent to
    pub recipient_id: String,
}

/// Relationship status as displayed to the user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    #[default]
    None,
    Pending,
    Connected,
    /// Any status string this client does not interpret
    Other(String),
}

impl ConnectionStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Self::None,
            "pending" => Self::Pending,
            "connected" | "accepted" => Self::Connected,
            _ => Self::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "NONE",
            Self::Pending => "PENDING",
            Self::Connected => "CONNECTED",
            Self::Other(s) => s,
        }
    }
}

impl Serialize for ConnectionStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.map(|s| Self::parse(&s)).unwrap_or_default())
    }
}

/// A connection candidate from `GET /network/suggestions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// String or integer on the wire
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Relationship status as reported by the server
    #[serde(default, rename = "connectionStatus")]
    pub status: ConnectionStatus,
    /// Profile fields this layer does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Suggestion {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ConnectionStatus::None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Paging for suggestion queries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl SuggestionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Query pairs for the parameters that are set
    pub fn params(&self) -> Vec<(&'static str, u32)> {
        [("limit", self.limit), ("offset", self.offset)]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect()
    }
}

// ==================== Normalization ====================

/// Extract the request identifier from a send response.
///
/// Accepted: `{"requestId": ..}`, `{"id": ..}`, `{"request": {"id": ..}}`.
/// A body without any identifier (e.g. `{}` or `null`) yields `None`; the
/// request still went through, the overlay just cannot map it yet.
pub fn parse_send_response(body: &Value) -> Result<Option<String>> {
    match body {
        Value::Null => Ok(None),
        Value::Object(obj) => {
            if let Some(id) = obj.get("requestId").or_else(|| obj.get("id")) {
                return id_string(id, "requestId").map(Some);
            }
            if let Some(request) = obj.get("request") {
                return match request.get("id") {
                    Some(id) => id_string(id, "request.id").map(Some),
                    None => Err(SyncError::InvalidResponse(
                        "send response has `request` without `id`".into(),
                    )),
                };
            }
            Ok(None)
        }
        other => Err(SyncError::InvalidResponse(format!(
            "send response must be an object, got {}",
            other
        ))),
    }
}

/// Normalize the outgoing pending list.
///
/// Accepted envelopes: `{"requests": [..]}`, `{"data": [..]}`, bare array.
/// Accepted target fields per entry: `recipientId`, `recipient_id`,
/// `targetId`, `recipient.id`.
pub fn parse_pending_requests(body: &Value) -> Result<Vec<PendingRequest>> {
    let entries = unwrap_list(body, &["requests", "data"], "pending request list")?;

    entries
        .iter()
        .map(|entry| {
            let id = entry
                .get("id")
                .ok_or_else(|| SyncError::InvalidResponse(format!("pending request without id: {}", entry)))
                .and_then(|v| id_string(v, "id"))?;

            let recipient = entry
                .get("recipientId")
                .or_else(|| entry.get("recipient_id"))
                .or_else(|| entry.get("targetId"))
                .or_else(|| entry.get("recipient").and_then(|r| r.get("id")))
                .ok_or_else(|| {
                    SyncError::InvalidResponse(format!("pending request {} has no recipient", id))
                })?;

            Ok(PendingRequest {
                recipient_id: id_string(recipient, "recipientId")?,
                id,
            })
        })
        .collect()
}

/// Normalize the suggestion list: bare array, `{"suggestions": [..]}` or `{"data": [..]}`.
pub fn parse_suggestions(body: &Value) -> Result<Vec<Suggestion>> {
    let entries = unwrap_list(body, &["suggestions", "data"], "suggestion list")?;

    entries
        .iter()
        .map(|entry| {
            serde_json::from_value::<Suggestion>(entry.clone()).map_err(|e| {
                SyncError::InvalidResponse(format!("unrecognized suggestion {}: {}", entry, e))
            })
        })
        .collect()
}

fn unwrap_list<'a>(body: &'a Value, envelopes: &[&str], what: &str) -> Result<&'a Vec<Value>> {
    if let Value::Array(items) = body {
        return Ok(items);
    }
    if let Value::Object(obj) = body {
        for key in envelopes {
            if let Some(Value::Array(items)) = obj.get(*key) {
                return Ok(items);
            }
        }
    }
    Err(SyncError::InvalidResponse(format!(
        "unrecognized {} shape: {}",
        what, body
    )))
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_string(&value, "id").map_err(serde::de::Error::custom)
}

/// Identifiers arrive as strings or integers; both normalize to a string.
fn id_string(value: &Value, field: &str) -> Result<String> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(SyncError::InvalidResponse(format!(
            "field `{}` is not an identifier: {}",
            field, other
        ))),
    }
}
