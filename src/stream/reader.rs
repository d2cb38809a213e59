//! Contains the [`StreamReader`], the [`Reader`] implementation for
//! Event Streams kept in a [`DocumentStore`].

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::event::{self, VersionSelect};
use crate::serde::{DecodeError, JsonSerializer};
use crate::store::{Document, DocumentStore, StoreError};
use crate::stream::{cancellable, load_metadata, CancelledError, Reader, StreamId, StreamMetadata};
use crate::version::Version;

/// All possible error types returned by [`Reader`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The read has been cancelled.
    #[error("stream read was cancelled: {0}")]
    Cancelled(#[from] CancelledError),

    /// A stored document could not be decoded.
    #[error("failed to decode stream document: {0}")]
    Decode(#[from] DecodeError),

    /// The document store returned an error.
    #[error("document store returned an error: {0}")]
    Store(#[from] StoreError),
}

/// [`Reader`] implementation for Event Streams stored in a [`DocumentStore`] container.
#[derive(Debug, Clone)]
pub struct StreamReader<S> {
    store: S,
    serializer: JsonSerializer,
    container: String,
}

impl<S> StreamReader<S>
where
    S: DocumentStore,
{
    /// Creates a new reader for the Streams stored in `container`.
    pub fn new(store: S, serializer: JsonSerializer, container: impl Into<String>) -> Self {
        Self {
            store,
            serializer,
            container: container.into(),
        }
    }

    /// Returns the event documents of the partition in version order,
    /// leaving out the metadata document and the versions not selected.
    fn select_events(documents: Vec<Document>, select: VersionSelect) -> Vec<Document> {
        let from = match select {
            VersionSelect::All => 1,
            VersionSelect::From(version) => version,
        };

        let mut events: Vec<(Version, Document)> = documents
            .into_iter()
            .filter_map(|document| {
                let version = document.id.parse::<Version>().ok()?;
                (version >= from).then_some((version, document))
            })
            .collect();

        events.sort_unstable_by_key(|(version, _)| *version);
        events.into_iter().map(|(_, document)| document).collect()
    }
}

#[async_trait]
impl<S> Reader for StreamReader<S>
where
    S: DocumentStore,
{
    async fn read_metadata(
        &self,
        stream_id: &StreamId,
        cancellation: &CancellationToken,
    ) -> Result<StreamMetadata, ReadError> {
        let (metadata, _) = cancellable(
            cancellation,
            load_metadata::<_, ReadError>(
                &self.store,
                &self.serializer,
                &self.container,
                stream_id,
            ),
        )
        .await??;

        Ok(metadata)
    }

    fn read<'a>(
        &'a self,
        stream_id: &'a StreamId,
        select: VersionSelect,
        cancellation: &'a CancellationToken,
    ) -> event::Stream<'a, ReadError> {
        stream::once(async move {
            let partition_key = stream_id.to_string();
            let documents = cancellable(
                cancellation,
                self.store.query(&self.container, &partition_key),
            )
            .await??;

            let events = Self::select_events(documents, select);

            tracing::debug!(
                stream_id = %stream_id,
                ?select,
                events = events.len(),
                "stream events loaded"
            );

            let decoded = stream::iter(events).filter_map(move |document| async move {
                if cancellation.is_cancelled() {
                    return Some(Err(ReadError::from(CancelledError)));
                }

                self.serializer
                    .decode_event(document.body)
                    .map_err(ReadError::from)
                    .transpose()
            });

            Ok::<_, ReadError>(decoded)
        })
        .try_flatten()
        .boxed()
    }
}
