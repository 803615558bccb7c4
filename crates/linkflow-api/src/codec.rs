// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deterministic event serialization.
//!
//! Two interchangeable encodings:
//!
//! - **JSON**: `{v, event_id, event_type, timestamp, evt_version, task_id,
//!   attributes}` where `attributes` is a plain object. Deserialization
//!   dispatches on `event_type` to pick the concrete attribute variant, so
//!   unknown fields inside `attributes` are tolerated for forward
//!   compatibility.
//! - **Binary**: a 1-byte serializer version prefix followed by the bincode
//!   encoding of the event.
//!
//! Both satisfy `decode(encode(e)) == e` structurally for every event kind.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{EventAttributes, EventType, HistoryEvent};

/// Current serializer version, written into both encodings.
pub const SERIALIZER_VERSION: u8 = 1;

/// Errors raised while encoding or decoding events.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Input was empty.
    #[error("cannot deserialize empty data")]
    Empty,

    /// The serializer version prefix is not supported.
    #[error("unsupported serializer version: {0}")]
    UnsupportedVersion(u8),

    /// The `event_type` discriminant is not part of the closed set.
    #[error("unknown event type: {0}")]
    UnknownEventType(i32),

    /// The serialized event carried no attributes object.
    #[error("event {0} has no attributes")]
    MissingAttributes(i64),

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary (de)serialization failed.
    #[error("binary error: {0}")]
    Binary(#[from] bincode::Error),
}

/// Encoding selector for [`Serializer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Structured JSON form.
    #[default]
    Json,
    /// Compact binary form.
    Binary,
}

/// Serializes and deserializes history events.
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    encoding: Encoding,
}

#[derive(Serialize, Deserialize)]
struct SerializedEvent {
    v: u8,
    event_id: i64,
    event_type: i32,
    timestamp: i64,
    evt_version: i64,
    task_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<Value>,
}

impl Serializer {
    /// Create a serializer for the given encoding.
    pub fn new(encoding: Encoding) -> Self {
        Self { encoding }
    }

    /// Create a JSON serializer.
    pub fn json() -> Self {
        Self::new(Encoding::Json)
    }

    /// Create a binary serializer.
    pub fn binary() -> Self {
        Self::new(Encoding::Binary)
    }

    /// Serialize one event.
    pub fn serialize(&self, event: &HistoryEvent) -> Result<Vec<u8>, CodecError> {
        match self.encoding {
            Encoding::Json => self.serialize_json(event),
            Encoding::Binary => self.serialize_binary(event),
        }
    }

    /// Deserialize one event.
    pub fn deserialize(&self, data: &[u8]) -> Result<HistoryEvent, CodecError> {
        if data.is_empty() {
            return Err(CodecError::Empty);
        }
        match self.encoding {
            Encoding::Json => self.deserialize_json(data),
            Encoding::Binary => self.deserialize_binary(data),
        }
    }

    /// Serialize a batch, preserving order.
    pub fn serialize_events(&self, events: &[HistoryEvent]) -> Result<Vec<Vec<u8>>, CodecError> {
        events.iter().map(|e| self.serialize(e)).collect()
    }

    /// Deserialize a batch, preserving order.
    pub fn deserialize_events(&self, blobs: &[Vec<u8>]) -> Result<Vec<HistoryEvent>, CodecError> {
        blobs.iter().map(|b| self.deserialize(b)).collect()
    }

    fn serialize_json(&self, event: &HistoryEvent) -> Result<Vec<u8>, CodecError> {
        let se = SerializedEvent {
            v: SERIALIZER_VERSION,
            event_id: event.event_id,
            event_type: event.event_type.code(),
            timestamp: event.timestamp.timestamp_nanos_opt().unwrap_or_default(),
            evt_version: event.version,
            task_id: event.task_id,
            attributes: Some(attributes_to_value(&event.attributes)?),
        };
        Ok(serde_json::to_vec(&se)?)
    }

    fn deserialize_json(&self, data: &[u8]) -> Result<HistoryEvent, CodecError> {
        let se: SerializedEvent = serde_json::from_slice(data)?;
        if se.v != SERIALIZER_VERSION {
            return Err(CodecError::UnsupportedVersion(se.v));
        }
        let event_type =
            EventType::from_code(se.event_type).ok_or(CodecError::UnknownEventType(se.event_type))?;
        let attrs_value = se
            .attributes
            .ok_or(CodecError::MissingAttributes(se.event_id))?;
        Ok(HistoryEvent {
            event_id: se.event_id,
            event_type,
            timestamp: DateTime::from_timestamp_nanos(se.timestamp),
            version: se.evt_version,
            task_id: se.task_id,
            attributes: attributes_from_value(event_type, attrs_value)?,
        })
    }

    fn serialize_binary(&self, event: &HistoryEvent) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(128);
        buf.push(SERIALIZER_VERSION);
        bincode::serialize_into(&mut buf, event)?;
        Ok(buf)
    }

    fn deserialize_binary(&self, data: &[u8]) -> Result<HistoryEvent, CodecError> {
        if data[0] != SERIALIZER_VERSION {
            return Err(CodecError::UnsupportedVersion(data[0]));
        }
        Ok(bincode::deserialize(&data[1..])?)
    }
}

/// Serialize attributes as a bare object, without the variant tag.
fn attributes_to_value(attrs: &EventAttributes) -> Result<Value, CodecError> {
    use EventAttributes::*;
    let value = match attrs {
        ExecutionStarted(a) => serde_json::to_value(a)?,
        ExecutionCompleted(a) => serde_json::to_value(a)?,
        ExecutionFailed(a) => serde_json::to_value(a)?,
        ExecutionTerminated(a) => serde_json::to_value(a)?,
        NodeScheduled(a) => serde_json::to_value(a)?,
        NodeStarted(a) => serde_json::to_value(a)?,
        NodeCompleted(a) => serde_json::to_value(a)?,
        NodeFailed(a) => serde_json::to_value(a)?,
        TimerStarted(a) => serde_json::to_value(a)?,
        TimerFired(a) => serde_json::to_value(a)?,
        TimerCanceled(a) => serde_json::to_value(a)?,
        ActivityScheduled(a) => serde_json::to_value(a)?,
        ActivityStarted(a) => serde_json::to_value(a)?,
        ActivityCompleted(a) => serde_json::to_value(a)?,
        ActivityFailed(a) => serde_json::to_value(a)?,
        ActivityTimedOut(a) => serde_json::to_value(a)?,
        SignalReceived(a) => serde_json::to_value(a)?,
        MarkerRecorded(a) => serde_json::to_value(a)?,
    };
    Ok(value)
}

/// Pick the concrete attribute variant for `event_type` and decode into it.
fn attributes_from_value(
    event_type: EventType,
    value: Value,
) -> Result<EventAttributes, CodecError> {
    use EventType::*;
    let attrs = match event_type {
        ExecutionStarted => EventAttributes::ExecutionStarted(serde_json::from_value(value)?),
        ExecutionCompleted => EventAttributes::ExecutionCompleted(serde_json::from_value(value)?),
        ExecutionFailed => EventAttributes::ExecutionFailed(serde_json::from_value(value)?),
        ExecutionTerminated => EventAttributes::ExecutionTerminated(serde_json::from_value(value)?),
        NodeScheduled => EventAttributes::NodeScheduled(serde_json::from_value(value)?),
        NodeStarted => EventAttributes::NodeStarted(serde_json::from_value(value)?),
        NodeCompleted => EventAttributes::NodeCompleted(serde_json::from_value(value)?),
        NodeFailed => EventAttributes::NodeFailed(serde_json::from_value(value)?),
        TimerStarted => EventAttributes::TimerStarted(serde_json::from_value(value)?),
        TimerFired => EventAttributes::TimerFired(serde_json::from_value(value)?),
        TimerCanceled => EventAttributes::TimerCanceled(serde_json::from_value(value)?),
        ActivityScheduled => EventAttributes::ActivityScheduled(serde_json::from_value(value)?),
        ActivityStarted => EventAttributes::ActivityStarted(serde_json::from_value(value)?),
        ActivityCompleted => EventAttributes::ActivityCompleted(serde_json::from_value(value)?),
        ActivityFailed => EventAttributes::ActivityFailed(serde_json::from_value(value)?),
        ActivityTimedOut => EventAttributes::ActivityTimedOut(serde_json::from_value(value)?),
        SignalReceived => EventAttributes::SignalReceived(serde_json::from_value(value)?),
        MarkerRecorded => EventAttributes::MarkerRecorded(serde_json::from_value(value)?),
    };
    Ok(attrs)
}
