//! Contains the [`StreamBatchWriter`], the [`BatchWriter`] implementation
//! appending events to Event Streams kept in a [`DocumentStore`].
//!
//! Each Stream lives in its own partition, where every event is a document
//! with its [Version] as id, next to a single [`StreamMetadata`] document.
//! A batch is committed as one transactional store batch that creates all
//! the event documents and rewrites the metadata document, conditional on
//! the metadata [`ETag`][crate::store::ETag] observed before the write.

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::event::{Payload, Persisted, StreamBatch};
use crate::serde::{DecodeError, EncodeError, Item, JsonSerializer};
use crate::store::{DocumentStore, Operation, StoreError};
use crate::stream::{
    cancellable, load_metadata, BatchWriter, CancelledError, StreamMetadata, StreamState,
    METADATA_DOCUMENT_ID,
};
use crate::version::{ConflictError, Version};

/// All possible error types returned by [`BatchWriter::write`].
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The Stream is not at the expected version, or it has been modified
    /// concurrently. No event of the batch has been written.
    #[error("failed to write stream batch: {0}")]
    Conflict(#[from] ConflictError),

    /// The write has been cancelled before being committed.
    #[error("stream batch write was cancelled: {0}")]
    Cancelled(#[from] CancelledError),

    /// An event or the metadata document could not be encoded.
    #[error("failed to encode stream batch document: {0}")]
    Encode(#[from] EncodeError),

    /// The stored metadata document could not be decoded.
    #[error("failed to decode stream metadata: {0}")]
    Decode(#[from] DecodeError),

    /// The document store returned an error.
    #[error("document store returned an error: {0}")]
    Store(#[from] StoreError),
}

impl From<WriteError> for Option<ConflictError> {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Conflict(v) => Some(v),
            _ => None,
        }
    }
}

/// [`BatchWriter`] implementation for Event Streams stored in a [`DocumentStore`] container.
#[derive(Debug, Clone)]
pub struct StreamBatchWriter<S> {
    store: S,
    serializer: JsonSerializer,
    container: String,
}

impl<S> StreamBatchWriter<S>
where
    S: DocumentStore,
{
    /// Creates a new writer for the Streams stored in `container`.
    pub fn new(store: S, serializer: JsonSerializer, container: impl Into<String>) -> Self {
        Self {
            store,
            serializer,
            container: container.into(),
        }
    }

    fn event_operation(&self, persisted: &Persisted) -> Result<Operation, EncodeError> {
        Ok(Operation::Create {
            id: persisted.version.to_string(),
            body: self.serializer.encode_event(persisted)?,
        })
    }
}

#[async_trait]
impl<S> BatchWriter for StreamBatchWriter<S>
where
    S: DocumentStore,
{
    async fn write(
        &self,
        batch: StreamBatch,
        cancellation: &CancellationToken,
    ) -> Result<StreamMetadata, WriteError> {
        let (stream_id, expected_version, events) = batch.into_parts();
        let partition_key = stream_id.to_string();

        let (current, etag) = cancellable(
            cancellation,
            load_metadata::<_, WriteError>(
                &self.store,
                &self.serializer,
                &self.container,
                &stream_id,
            ),
        )
        .await??;

        expected_version.check(current.current_version)?;

        let mut operations = Vec::with_capacity(events.len() + 1);
        let mut new_version: Version = current.current_version;

        for event in events {
            new_version += 1;

            let payload: &dyn Payload = event.payload.as_ref();
            let event_type = self
                .serializer
                .registry()
                .name_of(payload)
                .ok_or(EncodeError::UnregisteredType {
                    type_name: payload.type_name(),
                })?
                .to_owned();

            let persisted = Persisted {
                stream_id: stream_id.clone(),
                version: new_version,
                event_type,
                event,
            };

            operations.push(self.event_operation(&persisted)?);
        }

        let metadata = StreamMetadata {
            stream_id: stream_id.clone(),
            state: StreamState::Active,
            current_version: new_version,
            last_modified: Utc::now(),
        };

        let body = self.serializer.encode(&Item {
            id: METADATA_DOCUMENT_ID.to_owned(),
            pk: partition_key.clone(),
            body: &metadata,
        })?;

        operations.push(match etag {
            Some(if_match) => Operation::Replace {
                id: METADATA_DOCUMENT_ID.to_owned(),
                body,
                if_match,
            },
            None => Operation::Create {
                id: METADATA_DOCUMENT_ID.to_owned(),
                body,
            },
        });

        // Last chance to give up: once submitted, the batch is either fully applied or not at all.
        if cancellation.is_cancelled() {
            return Err(CancelledError.into());
        }

        match self
            .store
            .execute_batch(&self.container, &partition_key, operations)
            .await
        {
            Ok(()) => {}
            Err(StoreError::PreconditionFailed { .. }) => {
                let (latest, _) = load_metadata::<_, WriteError>(
                    &self.store,
                    &self.serializer,
                    &self.container,
                    &stream_id,
                )
                .await?;

                tracing::debug!(
                    stream_id = %stream_id,
                    expected = current.current_version,
                    actual = latest.current_version,
                    "stream modified concurrently, batch rejected"
                );

                return Err(ConflictError {
                    expected: current.current_version,
                    actual: latest.current_version,
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        }

        tracing::debug!(
            stream_id = %stream_id,
            from = current.current_version + 1,
            to = new_version,
            "stream batch committed"
        );

        Ok(metadata)
    }
}
