//! Module `event` contains types and abstractions helpful for working
//! with Domain Events recorded in Event Streams.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::stream::StreamId;
use crate::version::{ExpectedVersion, Version};

pub mod registry;

pub use registry::{EventTypeRegistry, RegistryError};

/// The data carried by a Domain Event.
///
/// Any `'static` type that is [Debug], [Send] and [Sync] is a [Payload]:
/// to be written to or read from an Event Stream, the type must also be
/// registered in an [`EventTypeRegistry`] with its discriminator name.
pub trait Payload: Any + Debug + Send + Sync {
    /// Returns the payload as [Any], used to recover the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Returns the Rust type name of the concrete payload type.
    fn type_name(&self) -> &'static str;
}

impl<T> Payload for T
where
    T: Any + Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl dyn Payload {
    /// Returns a reference to the concrete payload, if it is of type `T`.
    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns `true` if the concrete payload is of type `T`.
    pub fn is<T: Payload>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Optional context attached to a Domain Event.
///
/// Absent values are omitted from the wire document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Identifier shared by all the events produced by the same request or process.
    pub correlation_id: Option<String>,

    /// Identifier of the message that caused this event to be produced.
    pub causation_id: Option<String>,
}

/// A Domain Event that has not been recorded in an Event Stream yet.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Unique identifier of the event within its Event Stream.
    pub id: String,

    /// The Domain Event payload.
    pub payload: Arc<dyn Payload>,

    /// When the event was created. Set once, and never changed afterwards.
    pub timestamp: DateTime<Utc>,

    /// Optional context for the event.
    pub metadata: Metadata,
}

impl Envelope {
    /// Creates a new [Envelope] for the given payload, with a random id
    /// and the current time as timestamp.
    pub fn new<T: Payload>(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload: Arc::new(payload),
            timestamp: Utc::now(),
            metadata: Metadata::default(),
        }
    }

    /// Replaces the generated event id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the correlation id of the event.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(id.into());
        self
    }

    /// Sets the causation id of the event.
    #[must_use]
    pub fn with_causation_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.causation_id = Some(id.into());
        self
    }

    /// Returns the payload as `T`, if the payload is of that type.
    pub fn payload_as<T: Payload>(&self) -> Option<&T> {
        (*self.payload).downcast_ref::<T>()
    }
}

/// An [Envelope] that has been persisted to an Event Stream.
#[derive(Debug, Clone)]
pub struct Persisted {
    /// The id of the Event Stream the persisted Event belongs to.
    pub stream_id: StreamId,

    /// The version of the Event Stream when this Event has been recorded.
    ///
    /// Check the [Version] type and module documentation for more info.
    pub version: Version,

    /// The discriminator name of the payload type, as found in the [`EventTypeRegistry`].
    pub event_type: String,

    /// The actual Domain Event carried by this envelope.
    pub event: Envelope,
}

impl Persisted {
    /// Returns the payload as `T`, if the payload is of that type.
    pub fn payload_as<T: Payload>(&self) -> Option<&T> {
        self.event.payload_as::<T>()
    }
}

/// Specifies the slice of the Event Stream to select when reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelect {
    /// Selects all the Events in the Event Stream.
    All,

    /// Selects all the Events in the Event Stream starting from the Event
    /// with the specified [Version], included.
    From(Version),
}

impl VersionSelect {
    /// Selects the Events recorded after the one at the given position,
    /// which is how a consumer resumes from its checkpoint.
    pub fn after(position: Version) -> Self {
        VersionSelect::From(position.saturating_add(1))
    }
}

/// Stream is a stream of [Persisted] Domain Events.
pub type Stream<'a, Err> = BoxStream<'a, Result<Persisted, Err>>;

/// Error returned when building an invalid [`StreamBatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// A batch must carry at least one event.
    #[error("a stream batch must contain at least one event")]
    Empty,
}

/// An ordered, non-empty list of Domain Events to be appended to a
/// single Event Stream as one atomic unit.
#[derive(Debug, Clone)]
pub struct StreamBatch {
    stream_id: StreamId,
    expected_version: ExpectedVersion,
    events: Vec<Envelope>,
}

impl StreamBatch {
    /// Creates a new [`StreamBatch`] for the specified Event Stream.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Empty`] if no events are given.
    pub fn new(
        stream_id: StreamId,
        expected_version: impl Into<ExpectedVersion>,
        events: Vec<Envelope>,
    ) -> Result<Self, BatchError> {
        if events.is_empty() {
            return Err(BatchError::Empty);
        }

        Ok(Self {
            stream_id,
            expected_version: expected_version.into(),
            events,
        })
    }

    /// The Event Stream targeted by this batch.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// The version the writer believes the Event Stream is currently at.
    pub fn expected_version(&self) -> ExpectedVersion {
        self.expected_version
    }

    /// The events in the batch, in the order they will be recorded.
    pub fn events(&self) -> &[Envelope] {
        &self.events
    }

    pub(crate) fn into_parts(self) -> (StreamId, ExpectedVersion, Vec<Envelope>) {
        (self.stream_id, self.expected_version, self.events)
    }
}
