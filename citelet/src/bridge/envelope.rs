//! Wire envelopes for client-worker correlation.
//!
//! The channel is not exclusively ours, so both sides validate every inbound
//! value against these shapes before touching any field. Anything that is not
//! exactly a request or reply envelope is foreign traffic and gets dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id linking a request to its eventual reply.
///
/// Ids only need to be unique among the requests concurrently pending on one
/// client, so they come from a monotonically advancing counter. [`next`]
/// steps over a candidate that is still pending.
///
/// [`next`]: CorrelationId::next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The next candidate id.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-to-worker envelope: exactly an id and a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub id: CorrelationId,
    pub payload: Value,
}

impl Request {
    /// Strict parse of an inbound channel value.
    ///
    /// `None` covers every malformed shape: missing or mistyped fields,
    /// extra fields, non-object traffic. Conservative rejection is what
    /// makes ignoring foreign messages safe on a shared channel.
    pub fn from_value(raw: Value) -> Option<Self> {
        serde_json::from_value(raw).ok()
    }
}

impl From<Request> for Value {
    fn from(request: Request) -> Value {
        serde_json::json!({ "id": request.id, "payload": request.payload })
    }
}

/// Worker-to-client envelope: exactly an id and a tagged outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reply {
    pub id: CorrelationId,
    pub outcome: Outcome,
}

impl Reply {
    /// Strict parse of an inbound channel value; same rules as
    /// [`Request::from_value`].
    pub fn from_value(raw: Value) -> Option<Self> {
        serde_json::from_value(raw).ok()
    }
}

impl From<Reply> for Value {
    fn from(reply: Reply) -> Value {
        serde_json::json!({ "id": reply.id, "outcome": reply.outcome })
    }
}

/// Tagged result of one dispatch.
///
/// Never a bare value: the tag is what makes reply interpretation
/// unambiguous. A failure carries only a plain description because native
/// error objects cannot cross the serialization boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Failure(String),
}
