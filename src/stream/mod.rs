//! Module `stream` contains the Event Stream abstractions: the [`StreamId`]
//! and [`StreamMetadata`] types, and the interfaces used to write to, read from
//! and checkpoint Event Streams stored in a [`DocumentStore`][crate::store::DocumentStore].

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::future::Future;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::event::{self, StreamBatch, VersionSelect};
use crate::serde::{DecodeError, Item, JsonSerializer};
use crate::store::{DocumentStore, ETag, StoreError};
use crate::version::Version;

pub mod checkpoint;
pub mod reader;
pub mod writer;

pub use checkpoint::{Checkpoint, CheckpointError, StreamCheckpoints};
pub use reader::{ReadError, StreamReader};
pub use writer::{StreamBatchWriter, WriteError};

/// Id of the document holding the [`StreamMetadata`] in the Stream partition.
pub const METADATA_DOCUMENT_ID: &str = "meta-data";

const SEPARATOR: char = ':';

/// All possible error types returned when building a [`StreamId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamIdError {
    /// The partition part of the id is empty.
    #[error("stream id partition must not be empty")]
    EmptyPartition,

    /// The name part of the id is empty.
    #[error("stream id name must not be empty")]
    EmptyName,

    /// The partition contains the separator character.
    #[error("stream id partition '{0}' must not contain ':'")]
    InvalidPartition(String),

    /// The text is not in the `<partition>:<name>` form.
    #[error("'{0}' is not a valid stream id, expected '<partition>:<name>'")]
    Malformed(String),
}

/// Identifies an Event Stream.
///
/// A [`StreamId`] is made of a partition-scoping key (e.g. the kind of entity
/// the Stream is about) and a local name. Its textual form, `<partition>:<name>`,
/// is used as partition key in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamId {
    partition: String,
    name: String,
}

impl StreamId {
    /// Creates a new [`StreamId`].
    ///
    /// # Errors
    ///
    /// Fails if either part is empty, or if the partition contains `:`.
    pub fn new(partition: impl Into<String>, name: impl Into<String>) -> Result<Self, StreamIdError> {
        let partition = partition.into();
        let name = name.into();

        if partition.is_empty() {
            return Err(StreamIdError::EmptyPartition);
        }

        if partition.contains(SEPARATOR) {
            return Err(StreamIdError::InvalidPartition(partition));
        }

        if name.is_empty() {
            return Err(StreamIdError::EmptyName);
        }

        Ok(Self { partition, name })
    }

    /// The partition-scoping part of the id.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// The local name of the Stream within its partition.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}{}{}", self.partition, SEPARATOR, self.name)
    }
}

impl FromStr for StreamId {
    type Err = StreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (partition, name) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| StreamIdError::Malformed(s.to_owned()))?;

        Self::new(partition, name)
    }
}

impl TryFrom<String> for StreamId {
    type Error = StreamIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.to_string()
    }
}

/// The lifecycle state of an Event Stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    /// No event has been written to the Stream yet.
    New,
    /// The Stream holds at least one event.
    Active,
}

/// Summary of an Event Stream, rewritten atomically with every batch of events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetadata {
    /// The Stream this metadata refers to.
    pub stream_id: StreamId,

    /// The lifecycle state of the Stream.
    pub state: StreamState,

    /// The version of the last event written to the Stream, `0` if there is none.
    pub current_version: Version,

    /// When the Stream was last written, the Unix epoch if never.
    pub last_modified: DateTime<Utc>,
}

impl StreamMetadata {
    /// Returns the metadata of a Stream that has never been written.
    pub fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            state: StreamState::New,
            current_version: 0,
            last_modified: DateTime::<Utc>::default(),
        }
    }
}

/// Error returned when an operation is cancelled through its [`CancellationToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation has been cancelled")]
pub struct CancelledError;

/// Runs the future unless the token is, or gets, cancelled before it completes.
pub(crate) async fn cancellable<F>(
    cancellation: &CancellationToken,
    future: F,
) -> Result<F::Output, CancelledError>
where
    F: Future,
{
    if cancellation.is_cancelled() {
        return Err(CancelledError);
    }

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(CancelledError),
        output = future => Ok(output),
    }
}

/// Reads the [`StreamMetadata`] document of a Stream, together with its [`ETag`].
///
/// A missing document is returned as [`StreamMetadata::new`], with no [`ETag`].
pub(crate) async fn load_metadata<S, E>(
    store: &S,
    serializer: &JsonSerializer,
    container: &str,
    stream_id: &StreamId,
) -> Result<(StreamMetadata, Option<ETag>), E>
where
    S: DocumentStore + ?Sized,
    E: From<StoreError> + From<DecodeError>,
{
    let Some(document) = store
        .read(container, &stream_id.to_string(), METADATA_DOCUMENT_ID)
        .await?
    else {
        return Ok((StreamMetadata::new(stream_id.clone()), None));
    };

    let item: Option<Item<StreamMetadata>> = serializer.decode(document.body)?;
    let metadata = item.map_or_else(|| StreamMetadata::new(stream_id.clone()), |item| item.body);

    Ok((metadata, Some(document.etag)))
}

#[async_trait]
/// Interface used to append batches of Domain Events to Event Streams.
pub trait BatchWriter: Send + Sync {
    /// Appends the batch to its Event Stream as a single atomic unit.
    ///
    /// The result is the new [`StreamMetadata`] of the Stream, with all
    /// the events of the batch added to it.
    async fn write(
        &self,
        batch: StreamBatch,
        cancellation: &CancellationToken,
    ) -> Result<StreamMetadata, WriteError>;
}

#[async_trait]
/// Interface used to read Event Streams back.
pub trait Reader: Send + Sync {
    /// Returns the current [`StreamMetadata`] of the Stream.
    ///
    /// A Stream that has never been written is not an error: its metadata
    /// has version `0` and [`StreamState::New`].
    async fn read_metadata(
        &self,
        stream_id: &StreamId,
        cancellation: &CancellationToken,
    ) -> Result<StreamMetadata, ReadError>;

    /// Opens an Event Stream, streaming the selected Domain Events in version order.
    fn read<'a>(
        &'a self,
        stream_id: &'a StreamId,
        select: VersionSelect,
        cancellation: &'a CancellationToken,
    ) -> event::Stream<'a, ReadError>;
}

#[async_trait]
/// Interface used to read the [Checkpoint] of a named consumer on a Stream.
pub trait CheckpointReader: Send + Sync {
    /// Returns the last [Checkpoint] recorded by the consumer `name` on the Stream,
    /// or `None` if it has never recorded one.
    async fn read<T>(
        &self,
        name: &str,
        stream_id: &StreamId,
        cancellation: &CancellationToken,
    ) -> Result<Option<Checkpoint<T>>, CheckpointError>
    where
        T: DeserializeOwned + Send;
}

#[async_trait]
/// Interface used to record the [Checkpoint] of a named consumer on a Stream.
pub trait CheckpointWriter: Send + Sync {
    /// Records that the consumer `name` processed the Stream up to `position`,
    /// replacing any previous [Checkpoint] of the same consumer.
    ///
    /// The `position` can not be ahead of the current version of the Stream.
    async fn write<T>(
        &self,
        name: &str,
        stream_id: &StreamId,
        position: Version,
        state: Option<T>,
        cancellation: &CancellationToken,
    ) -> Result<Checkpoint<T>, CheckpointError>
    where
        T: Serialize + Send + Sync;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_text_form_round_trips() {
        let id = StreamId::new("orders", "order-42").expect("valid stream id");

        assert_eq!("orders:order-42", id.to_string());
        assert_eq!(Ok(id), "orders:order-42".parse::<StreamId>());
    }

    #[test]
    fn stream_id_name_may_contain_the_separator() {
        let id: StreamId = "orders:eu:order-42".parse().expect("valid stream id");

        assert_eq!("orders", id.partition());
        assert_eq!("eu:order-42", id.name());
    }

    #[test]
    fn invalid_stream_ids_are_rejected() {
        assert_eq!(Err(StreamIdError::EmptyPartition), StreamId::new("", "a"));
        assert_eq!(Err(StreamIdError::EmptyName), StreamId::new("a", ""));
        assert_eq!(
            Err(StreamIdError::InvalidPartition("a:b".to_owned())),
            StreamId::new("a:b", "c")
        );
        assert_eq!(
            Err(StreamIdError::Malformed("orders".to_owned())),
            "orders".parse::<StreamId>()
        );
    }

    #[test]
    fn stream_id_is_encoded_as_a_string() {
        let id = StreamId::new("orders", "order-42").expect("valid stream id");

        let value = serde_json::to_value(&id).expect("stream id should encode");
        assert_eq!(serde_json::json!("orders:order-42"), value);

        let decoded: StreamId = serde_json::from_value(value).expect("stream id should decode");
        assert_eq!(id, decoded);
    }

    #[test]
    fn metadata_state_is_encoded_by_name() {
        let metadata = StreamMetadata::new(StreamId::new("orders", "order-42").expect("valid"));

        let value = serde_json::to_value(&metadata).expect("metadata should encode");

        assert_eq!(serde_json::json!("New"), value["state"]);
        assert_eq!(serde_json::json!(0), value["currentVersion"]);
    }

    #[tokio::test]
    async fn cancellable_does_not_poll_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let result = cancellable(&token, async { panic!("must not be polled") }).await;

        assert_eq!(Err(CancelledError), result);
    }

    #[tokio::test]
    async fn cancellable_returns_the_future_output() {
        let token = CancellationToken::new();

        assert_eq!(Ok(42), cancellable(&token, async { 42 }).await);
    }
}
