//! Call-setup envelopes relayed between two characters.

use std::str::FromStr;

use serde_json::{Map, Value};

use crate::push::PushEvent;
use crate::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice_candidate",
        }
    }

    /// Name of the body field that carries the opaque payload.
    pub fn payload_field(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "candidate",
        }
    }
}

impl FromStr for SignalKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offer" => Ok(Self::Offer),
            "answer" => Ok(Self::Answer),
            "ice_candidate" => Ok(Self::IceCandidate),
            other => Err(ProtocolError::UnknownSignalKind(other.to_string())),
        }
    }
}

/// A routed signaling envelope. Only `kind`, `from` and `to` are read; the
/// original body is kept untouched and forwarded as is.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope {
    pub kind: SignalKind,
    pub from: String,
    pub to: String,
    body: Value,
}

impl SignalEnvelope {
    pub fn new(kind: SignalKind, from: &str, to: &str, payload: Value) -> Self {
        let mut body = Map::new();
        body.insert("type".into(), Value::String(kind.as_str().to_string()));
        body.insert("from".into(), Value::String(from.to_string()));
        body.insert("to".into(), Value::String(to.to_string()));
        body.insert(kind.payload_field().into(), payload);
        Self {
            kind,
            from: from.to_string(),
            to: to.to_string(),
            body: Value::Object(body),
        }
    }

    /// Extract the routing fields from a submitted body.
    pub fn from_body(body: Value) -> Result<Self, ProtocolError> {
        let kind = routing_field(&body, "type")?.parse::<SignalKind>()?;
        let from = routing_field(&body, "from")?.to_string();
        let to = routing_field(&body, "to")?.to_string();
        Ok(Self { kind, from, to, body })
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Opaque payload (`offer`, `answer` or `candidate`), if any was sent.
    pub fn payload(&self) -> Option<&Value> {
        self.body.get(self.kind.payload_field())
    }

    pub fn into_push_event(self) -> PushEvent {
        match self.kind {
            SignalKind::Offer => PushEvent::RtcOffer(self.body),
            SignalKind::Answer => PushEvent::RtcAnswer(self.body),
            SignalKind::IceCandidate => PushEvent::RtcIceCandidate(self.body),
        }
    }
}

fn routing_field<'a>(body: &'a Value, name: &'static str) -> Result<&'a str, ProtocolError> {
    body.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ProtocolError::MissingField(name))
}
