use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Settled result of fetching one key.
pub type Outcome = Result<Value, FetchError>;

/// Error descriptor stored in a failed entry and handed to every joiner.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    /// Non-success status code or a failure to reach the remote.
    #[error("{message}")]
    Transport {
        #[serde(default)]
        status: Option<u16>,
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Failed to parse response: {message}")]
    Decode { message: String },
}

impl FetchError {
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self::Transport {
            status: Some(status),
            message: format!("HTTP error! Status: {status}"),
        }
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        Self::decode(e.to_string())
    }
}

/// Durable record for one key. Exactly one of `data`/`error` is set once settled.
///
/// `data` is omitted from the encoded form when unset, so a resolved JSON
/// `null` (written as `"data": null`) stays distinct from "no data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<FetchError>,
    /// Milliseconds since the Unix epoch of the last settle
    pub timestamp: i64,
}

// A present field is set, even when it holds `null`
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl CacheEntry {
    #[must_use]
    pub fn resolved(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn failed(error: FetchError) -> Self {
        Self {
            data: None,
            error: Some(error),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn from_outcome(outcome: &Outcome) -> Self {
        match outcome {
            Ok(data) => Self::resolved(data.clone()),
            Err(e) => Self::failed(e.clone()),
        }
    }

    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.data.is_some() || self.error.is_some()
    }

    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// The settled outcome, or `None` for an entry that never completed.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        match (&self.data, &self.error) {
            (Some(data), _) => Some(Ok(data.clone())),
            (None, Some(error)) => Some(Err(error.clone())),
            (None, None) => None,
        }
    }

    #[must_use]
    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    #[must_use]
    pub fn age(&self) -> chrono::Duration {
        self.settled_at()
            .map_or_else(chrono::Duration::zero, |at| Utc::now() - at)
    }
}

/// Lifecycle position of a key within one cache context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Empty,
    Pending,
    Resolved,
    Failed,
}
