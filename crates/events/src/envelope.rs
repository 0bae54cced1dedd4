use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;

/// Published unit: an event plus ordering metadata.
///
/// `sequence_number` is assigned by the publisher and increases by one per
/// successful write, so gaps mean a subscriber missed something.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    event_version: u32,
    sequence_number: u64,
    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap `payload`, copying its type and version into the envelope.
    pub fn seal(sequence_number: u64, payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: payload.event_type().to_string(),
            event_version: payload.version(),
            sequence_number,
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
