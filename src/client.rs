//! Contains the [`EventStore`], a single entry point bundling the
//! stream writer, the stream reader and the checkpoints of an event store
//! built on a [`DocumentStore`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::event::{self, EventTypeRegistry, StreamBatch, VersionSelect};
use crate::serde::JsonSerializer;
use crate::store::DocumentStore;
use crate::stream::{
    BatchWriter, Checkpoint, CheckpointError, CheckpointReader, CheckpointWriter, ReadError,
    Reader, StreamBatchWriter, StreamCheckpoints, StreamId, StreamMetadata, StreamReader,
    WriteError,
};
use crate::version::Version;

/// An event store on top of a [`DocumentStore`].
///
/// All the components share the same store handle and [`JsonSerializer`],
/// so the [`EventTypeRegistry`] given at creation is used for every Stream.
#[derive(Debug, Clone)]
pub struct EventStore<S> {
    config: Config,
    serializer: JsonSerializer,
    writer: StreamBatchWriter<S>,
    reader: StreamReader<S>,
    checkpoints: StreamCheckpoints<S>,
}

impl<S> EventStore<S>
where
    S: DocumentStore + Clone,
{
    /// Creates a new [`EventStore`] using the containers named in the [Config].
    pub fn new(store: S, registry: EventTypeRegistry, config: Config) -> Self {
        let serializer = JsonSerializer::new(registry).with_options(config.serializer_options());

        Self {
            writer: StreamBatchWriter::new(
                store.clone(),
                serializer.clone(),
                config.events_container.clone(),
            ),
            reader: StreamReader::new(
                store.clone(),
                serializer.clone(),
                config.events_container.clone(),
            ),
            checkpoints: StreamCheckpoints::new(
                store,
                serializer.clone(),
                config.checkpoints_container.clone(),
                config.events_container.clone(),
            ),
            serializer,
            config,
        }
    }

    /// The configuration the store has been created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The serializer used for all the documents.
    pub fn serializer(&self) -> &JsonSerializer {
        &self.serializer
    }

    /// The [`BatchWriter`] used by [`EventStore::write_to_stream`].
    pub fn writer(&self) -> &StreamBatchWriter<S> {
        &self.writer
    }

    /// The [Reader] used by [`EventStore::read_from_stream`] and [`EventStore::read_stream_metadata`].
    pub fn reader(&self) -> &StreamReader<S> {
        &self.reader
    }

    /// The checkpoints used by [`EventStore::read_checkpoint`] and [`EventStore::write_checkpoint`].
    pub fn checkpoints(&self) -> &StreamCheckpoints<S> {
        &self.checkpoints
    }

    /// Appends the batch to its Event Stream, see [`BatchWriter::write`].
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Conflict`] if the Stream is not at the expected version.
    pub async fn write_to_stream(
        &self,
        batch: StreamBatch,
        cancellation: &CancellationToken,
    ) -> Result<StreamMetadata, WriteError> {
        self.writer.write(batch, cancellation).await
    }

    /// Streams the selected events of the Event Stream, in version order.
    pub fn read_from_stream<'a>(
        &'a self,
        stream_id: &'a StreamId,
        select: VersionSelect,
        cancellation: &'a CancellationToken,
    ) -> event::Stream<'a, ReadError> {
        self.reader.read(stream_id, select, cancellation)
    }

    /// Returns the current metadata of the Event Stream.
    ///
    /// # Errors
    ///
    /// Returns a [`ReadError`] if the metadata could not be read.
    pub async fn read_stream_metadata(
        &self,
        stream_id: &StreamId,
        cancellation: &CancellationToken,
    ) -> Result<StreamMetadata, ReadError> {
        self.reader.read_metadata(stream_id, cancellation).await
    }

    /// Returns the checkpoint of the named consumer on the Event Stream, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckpointError`] if the checkpoint could not be read.
    pub async fn read_checkpoint<T>(
        &self,
        name: &str,
        stream_id: &StreamId,
        cancellation: &CancellationToken,
    ) -> Result<Option<Checkpoint<T>>, CheckpointError>
    where
        T: DeserializeOwned + Send,
    {
        CheckpointReader::read(&self.checkpoints, name, stream_id, cancellation).await
    }

    /// Records the checkpoint of the named consumer on the Event Stream.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::PositionAhead`] if `position` is past the
    /// current version of the Stream.
    pub async fn write_checkpoint<T>(
        &self,
        name: &str,
        stream_id: &StreamId,
        position: Version,
        state: Option<T>,
        cancellation: &CancellationToken,
    ) -> Result<Checkpoint<T>, CheckpointError>
    where
        T: Serialize + Send + Sync,
    {
        CheckpointWriter::write(
            &self.checkpoints,
            name,
            stream_id,
            position,
            state,
            cancellation,
        )
        .await
    }
}
