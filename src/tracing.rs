//! Module containing some extension traits to support code instrumentation
//! using the `tracing` crate.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::event::{self, StreamBatch, VersionSelect};
use crate::stream::{
    BatchWriter, Checkpoint, CheckpointError, CheckpointReader, CheckpointWriter, ReadError,
    Reader, StreamId, StreamMetadata, WriteError,
};
use crate::version::Version;

/// [`BatchWriter`] type wrapper that provides instrumentation
/// features through the `tracing` crate.
#[derive(Debug, Clone)]
pub struct InstrumentedBatchWriter<T>
where
    T: BatchWriter,
{
    inner: T,
}

#[async_trait]
impl<T> BatchWriter for InstrumentedBatchWriter<T>
where
    T: BatchWriter,
{
    #[allow(clippy::blocks_in_conditions)]
    #[instrument(name = "stream::BatchWriter.write", ret, err, skip(self, cancellation))]
    async fn write(
        &self,
        batch: StreamBatch,
        cancellation: &CancellationToken,
    ) -> Result<StreamMetadata, WriteError> {
        self.inner.write(batch, cancellation).await
    }
}

/// Extension trait for any [`BatchWriter`] type to provide
/// instrumentation features through the `tracing` crate.
pub trait BatchWriterExt: BatchWriter + Sized {
    /// Returns an instrumented version of the [`BatchWriter`] instance.
    fn with_tracing(self) -> InstrumentedBatchWriter<Self> {
        InstrumentedBatchWriter { inner: self }
    }
}

impl<T> BatchWriterExt for T where T: BatchWriter {}

/// [Reader] type wrapper that provides instrumentation
/// features through the `tracing` crate.
#[derive(Debug, Clone)]
pub struct InstrumentedReader<T>
where
    T: Reader,
{
    inner: T,
}

#[async_trait]
impl<T> Reader for InstrumentedReader<T>
where
    T: Reader,
{
    #[allow(clippy::blocks_in_conditions)]
    #[instrument(
        name = "stream::Reader.read_metadata",
        ret,
        err,
        skip(self, cancellation)
    )]
    async fn read_metadata(
        &self,
        stream_id: &StreamId,
        cancellation: &CancellationToken,
    ) -> Result<StreamMetadata, ReadError> {
        self.inner.read_metadata(stream_id, cancellation).await
    }

    #[instrument(name = "stream::Reader.read", skip(self, cancellation))]
    fn read<'a>(
        &'a self,
        stream_id: &'a StreamId,
        select: VersionSelect,
        cancellation: &'a CancellationToken,
    ) -> event::Stream<'a, ReadError> {
        self.inner.read(stream_id, select, cancellation)
    }
}

/// Extension trait for any [Reader] type to provide
/// instrumentation features through the `tracing` crate.
pub trait ReaderExt: Reader + Sized {
    /// Returns an instrumented version of the [Reader] instance.
    fn with_tracing(self) -> InstrumentedReader<Self> {
        InstrumentedReader { inner: self }
    }
}

impl<T> ReaderExt for T where T: Reader {}

/// [`CheckpointReader`] and [`CheckpointWriter`] type wrapper that provides
/// instrumentation features through the `tracing` crate.
#[derive(Debug, Clone)]
pub struct InstrumentedCheckpoints<T>
where
    T: CheckpointReader + CheckpointWriter,
{
    inner: T,
}

#[async_trait]
impl<T> CheckpointReader for InstrumentedCheckpoints<T>
where
    T: CheckpointReader + CheckpointWriter,
{
    #[allow(clippy::blocks_in_conditions)]
    #[instrument(name = "stream::CheckpointReader.read", err, skip(self, cancellation))]
    async fn read<S>(
        &self,
        name: &str,
        stream_id: &StreamId,
        cancellation: &CancellationToken,
    ) -> Result<Option<Checkpoint<S>>, CheckpointError>
    where
        S: DeserializeOwned + Send,
    {
        self.inner.read(name, stream_id, cancellation).await
    }
}

#[async_trait]
impl<T> CheckpointWriter for InstrumentedCheckpoints<T>
where
    T: CheckpointReader + CheckpointWriter,
{
    #[allow(clippy::blocks_in_conditions)]
    #[instrument(
        name = "stream::CheckpointWriter.write",
        err,
        skip(self, state, cancellation)
    )]
    async fn write<S>(
        &self,
        name: &str,
        stream_id: &StreamId,
        position: Version,
        state: Option<S>,
        cancellation: &CancellationToken,
    ) -> Result<Checkpoint<S>, CheckpointError>
    where
        S: Serialize + Send + Sync,
    {
        self.inner
            .write(name, stream_id, position, state, cancellation)
            .await
    }
}

/// Extension trait for any type implementing both [`CheckpointReader`] and
/// [`CheckpointWriter`] to provide instrumentation features through the `tracing` crate.
pub trait CheckpointsExt: CheckpointReader + CheckpointWriter + Sized {
    /// Returns an instrumented version of the checkpoints instance.
    fn with_tracing(self) -> InstrumentedCheckpoints<Self> {
        InstrumentedCheckpoints { inner: self }
    }
}

impl<T> CheckpointsExt for T where T: CheckpointReader + CheckpointWriter {}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;
    use crate::event::tests::ItemAdded;
    use crate::event::{Envelope, EventTypeRegistry};
    use crate::serde::JsonSerializer;
    use crate::store::InMemory;
    use crate::stream::{StreamBatchWriter, StreamCheckpoints, StreamReader};
    use crate::version::ExpectedVersion;

    fn serializer() -> JsonSerializer {
        JsonSerializer::new(
            EventTypeRegistry::new()
                .with::<ItemAdded>("item-added")
                .expect("registry should be built"),
        )
    }

    #[tokio::test]
    async fn instrumented_components_delegate_to_the_inner_ones() {
        let store = InMemory::default();
        let token = CancellationToken::new();
        let id = StreamId::new("cart", "cart-1").expect("valid stream id");

        let writer = StreamBatchWriter::new(store.clone(), serializer(), "events").with_tracing();
        let reader = StreamReader::new(store.clone(), serializer(), "events").with_tracing();
        let checkpoints =
            StreamCheckpoints::new(store, serializer(), "checkpoints", "events").with_tracing();

        let batch = StreamBatch::new(
            id.clone(),
            ExpectedVersion::START_OF_STREAM,
            vec![Envelope::new(ItemAdded {
                item_id: "item-1".to_owned(),
                quantity: 1,
            })],
        )
        .expect("batch is not empty");

        writer.write(batch, &token).await.expect("write should succeed");

        let events: Vec<_> = reader
            .read(&id, VersionSelect::All, &token)
            .try_collect()
            .await
            .expect("stream should be read");

        assert_eq!(1, events.len());

        checkpoints
            .write::<u32>("counter", &id, 1, Some(1), &token)
            .await
            .expect("checkpoint should be written");

        let checkpoint = checkpoints
            .read::<u32>("counter", &id, &token)
            .await
            .expect("checkpoint should be read")
            .expect("checkpoint exists");

        assert_eq!(Some(1), checkpoint.state);
        assert_eq!(
            1,
            reader
                .read_metadata(&id, &token)
                .await
                .expect("metadata should be read")
                .current_version
        );
    }
}
