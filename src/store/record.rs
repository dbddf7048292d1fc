use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::codec::EventCodec;
use crate::event::AnyEvent;
use crate::store::{EventStoreError, StoreEvent};
use crate::types::SequenceNumber;

/// Event representation on the event store: the json payload plus the type tag needed to
/// rebuild the concrete event.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: Uuid,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub occurred_on: DateTime<Utc>,
    pub sequence_number: SequenceNumber,
}

impl EventRecord {
    pub(crate) fn encode(
        codec: &EventCodec,
        aggregate_id: &str,
        event: &AnyEvent,
        occurred_on: DateTime<Utc>,
        sequence_number: SequenceNumber,
    ) -> Result<Self, EventStoreError> {
        let (event_type, payload) = codec.encode(event)?;

        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            occurred_on,
            sequence_number,
        })
    }

    /// Decodes the payload through `codec`, giving back the event with its original type.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if the type tag is unknown or the payload is malformed.
    pub fn try_into_store_event(self, codec: &EventCodec) -> Result<StoreEvent, EventStoreError> {
        Ok(StoreEvent {
            id: self.id,
            payload: codec.decode(&self.event_type, self.payload)?,
            aggregate_id: self.aggregate_id,
            occurred_on: self.occurred_on,
            sequence_number: self.sequence_number,
        })
    }
}
