//! This module provides the JSON wire format used for every document
//! stored by this crate: events, stream metadata and checkpoints.
//!
//! The encoding rules are the same for all documents:
//!
//! * keys use lower camel-case (types declare `#[serde(rename_all = "camelCase")]`),
//! * enumerations are written with their variant names,
//! * durations use the ISO-8601 text form, see the [duration] module,
//! * fields with a `null` value are omitted from the document.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{Envelope, EventTypeRegistry, Metadata, Persisted};
use crate::stream::StreamId;
use crate::version::Version;

pub mod duration;

/// All possible error types returned when encoding a value into a document.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The value to encode has no content, i.e. its JSON form is `null`.
    #[error("value to encode must not be null")]
    NullValue,

    /// The event payload type has not been registered in the [`EventTypeRegistry`].
    #[error("payload type '{type_name}' has no registered event type name")]
    UnregisteredType {
        /// The Rust type name of the payload.
        type_name: &'static str,
    },

    /// The discriminator of the event does not match the one registered for its payload type.
    #[error("event type '{found}' does not match the registered event type '{registered}'")]
    EventTypeMismatch {
        /// The discriminator registered for the payload type.
        registered: String,
        /// The discriminator carried by the event.
        found: String,
    },

    /// The value could not be converted to JSON.
    #[error("failed to encode value to json: {0}")]
    Json(#[source] serde_json::Error),
}

/// All possible error types returned when decoding a document.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The event discriminator has no payload type registered for it.
    #[error("unknown event type '{0}', no payload type is registered for it")]
    UnknownEventType(String),

    /// The document is not valid JSON for the requested type.
    #[error("failed to decode value from json: {0}")]
    Json(#[source] serde_json::Error),

    /// The event payload does not match the registered payload type.
    #[error("failed to decode payload of event type '{event_type}': {source}")]
    Payload {
        /// The discriminator found in the document.
        event_type: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// The raw bytes of a document, returned unchanged by [`JsonSerializer::decode`].
///
/// Requesting this type selects the pass-through decode mode, used for
/// payloads that are not JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDocument(pub Vec<u8>);

impl RawDocument {
    /// Returns the document bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for RawDocument {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for RawDocument {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

/// A type that can be decoded from a non-empty document.
///
/// [`JsonSerializer::decode`] returns [`Default::default`] for empty documents,
/// and delegates to this trait otherwise. Any [`DeserializeOwned`] type is parsed
/// as JSON, while [`RawDocument`] receives the bytes untouched.
pub trait FromDocument: Default {
    /// Decodes the value from the document bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the bytes do not represent a valid value.
    fn from_document(data: Vec<u8>) -> Result<Self, DecodeError>;
}

impl<T> FromDocument for T
where
    T: DeserializeOwned + Default,
{
    fn from_document(data: Vec<u8>) -> Result<Self, DecodeError> {
        serde_json::from_slice(&data).map_err(DecodeError::Json)
    }
}

impl FromDocument for RawDocument {
    fn from_document(data: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(RawDocument(data))
    }
}

/// Options for the [`JsonSerializer`] output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializerOptions {
    /// Writes indented JSON documents instead of compact ones.
    pub indented: bool,
}

/// An item stored in a document store container: the document `id`,
/// its partition key `pk`, and the fields of the wrapped value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Item<T> {
    pub(crate) id: String,
    pub(crate) pk: String,
    #[serde(flatten)]
    pub(crate) body: T,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDocument {
    id: String,
    pk: String,
    #[serde(rename = "type")]
    event_type: String,
    event_id: String,
    stream_id: StreamId,
    version: Version,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    causation_id: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Removes all the `null` fields from the JSON objects in the value.
///
/// Array elements are kept as they are, since removing them would shift positions.
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, field| !field.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Serializer for the documents written to, and read from, the document store.
///
/// Event payloads are resolved through the [`EventTypeRegistry`]
/// the serializer has been created with.
#[derive(Debug, Clone)]
pub struct JsonSerializer {
    registry: Arc<EventTypeRegistry>,
    options: SerializerOptions,
}

impl JsonSerializer {
    /// Creates a new serializer using the given registry for event payloads.
    pub fn new(registry: EventTypeRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            options: SerializerOptions::default(),
        }
    }

    /// Replaces the output options of the serializer.
    #[must_use]
    pub fn with_options(mut self, options: SerializerOptions) -> Self {
        self.options = options;
        self
    }

    /// The registry used to resolve event payload types.
    pub fn registry(&self) -> &EventTypeRegistry {
        &self.registry
    }

    /// Encodes the value into a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::NullValue`] when the value has no content
    /// (e.g. `None`), or [`EncodeError::Json`] if the value cannot be represented as JSON.
    pub fn encode<T>(&self, value: &T) -> Result<Vec<u8>, EncodeError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value).map_err(EncodeError::Json)?;
        self.write(value)
    }

    /// Decodes a document into `T`.
    ///
    /// An empty document decodes into `T::default()`; for `Option`s this
    /// represents an absent document.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the document is not a valid `T`.
    pub fn decode<T>(&self, data: Vec<u8>) -> Result<T, DecodeError>
    where
        T: FromDocument,
    {
        if data.is_empty() {
            return Ok(T::default());
        }

        T::from_document(data)
    }

    /// Encodes a [Persisted] event into its document.
    ///
    /// The [`Persisted::event_type`] must be the discriminator registered
    /// for the payload type.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnregisteredType`] if the payload type was never registered,
    /// or [`EncodeError::EventTypeMismatch`] if the event carries another discriminator.
    pub fn encode_event(&self, event: &Persisted) -> Result<Vec<u8>, EncodeError> {
        let (event_type, data) = self.registry.encode(event.event.payload.as_ref())?;

        if event_type != event.event_type {
            return Err(EncodeError::EventTypeMismatch {
                registered: event_type.to_owned(),
                found: event.event_type.clone(),
            });
        }

        let document = EventDocument {
            id: event.version.to_string(),
            pk: event.stream_id.to_string(),
            event_type: event_type.to_owned(),
            event_id: event.event.id.clone(),
            stream_id: event.stream_id.clone(),
            version: event.version,
            timestamp: event.event.timestamp,
            correlation_id: event.event.metadata.correlation_id.clone(),
            causation_id: event.event.metadata.causation_id.clone(),
            data,
        };

        self.encode(&document)
    }

    /// Decodes an event document into a [Persisted] event.
    ///
    /// An empty document decodes into `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownEventType`] if the discriminator of the document
    /// has no registered payload type.
    pub fn decode_event(&self, data: Vec<u8>) -> Result<Option<Persisted>, DecodeError> {
        let Some(document) = self.decode::<Option<EventDocument>>(data)? else {
            return Ok(None);
        };

        let payload = self.registry.decode(&document.event_type, document.data)?;

        Ok(Some(Persisted {
            stream_id: document.stream_id,
            version: document.version,
            event_type: document.event_type,
            event: Envelope {
                id: document.event_id,
                payload,
                timestamp: document.timestamp,
                metadata: Metadata {
                    correlation_id: document.correlation_id,
                    causation_id: document.causation_id,
                },
            },
        }))
    }

    fn write(&self, mut value: Value) -> Result<Vec<u8>, EncodeError> {
        if value.is_null() {
            return Err(EncodeError::NullValue);
        }

        strip_nulls(&mut value);

        if self.options.indented {
            serde_json::to_vec_pretty(&value)
        } else {
            serde_json::to_vec(&value)
        }
        .map_err(EncodeError::Json)
    }
}
