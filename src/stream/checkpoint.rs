//! Contains [`StreamCheckpoints`], recording how far named consumers
//! (e.g. projections) have processed an Event Stream.
//!
//! Checkpoints are kept in their own container, in the same partition
//! layout as the Streams: one document per consumer name, in the partition
//! of the Stream it refers to. Delivery based on checkpoints is at-least-once:
//! a consumer failing between processing an event and recording its
//! checkpoint will see the event again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::serde::{DecodeError, EncodeError, Item, JsonSerializer};
use crate::store::{DocumentStore, StoreError};
use crate::stream::{
    cancellable, load_metadata, CancelledError, CheckpointReader, CheckpointWriter, StreamId,
};
use crate::version::Version;

/// The position reached by a named consumer on an Event Stream,
/// optionally with some consumer-defined state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint<T> {
    /// Name of the consumer owning the checkpoint.
    pub name: String,

    /// The Stream the checkpoint refers to.
    pub stream_id: StreamId,

    /// Version of the last event processed by the consumer.
    pub position: Version,

    /// When the checkpoint was recorded.
    pub timestamp: DateTime<Utc>,

    /// State of the consumer at `position`, if any.
    ///
    /// Absent states are left out of the document, so a state whose JSON form
    /// is `null` (e.g. `Some(())`) can not be told apart from `None` and is
    /// rejected by [`CheckpointWriter::write`].
    pub state: Option<T>,
}

/// All possible error types returned by [`CheckpointReader`] and [`CheckpointWriter`].
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// The operation has been cancelled.
    #[error("checkpoint operation was cancelled: {0}")]
    Cancelled(#[from] CancelledError),

    /// The checkpoint position is ahead of the Stream current version.
    #[error("checkpoint position {position} is ahead of the stream version {current}")]
    PositionAhead {
        /// The requested checkpoint position.
        position: Version,
        /// The current version of the Stream.
        current: Version,
    },

    /// The checkpoint could not be encoded.
    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] EncodeError),

    /// The stored checkpoint, or the Stream metadata, could not be decoded.
    #[error("failed to decode checkpoint: {0}")]
    Decode(#[from] DecodeError),

    /// The document store returned an error.
    #[error("document store returned an error: {0}")]
    Store(#[from] StoreError),
}

/// [`CheckpointReader`] and [`CheckpointWriter`] implementation backed by a [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct StreamCheckpoints<S> {
    store: S,
    serializer: JsonSerializer,
    checkpoint_container: String,
    event_container: String,
}

impl<S> StreamCheckpoints<S>
where
    S: DocumentStore,
{
    /// Creates a new instance recording checkpoints in `checkpoint_container`,
    /// for the Streams stored in `event_container`.
    pub fn new(
        store: S,
        serializer: JsonSerializer,
        checkpoint_container: impl Into<String>,
        event_container: impl Into<String>,
    ) -> Self {
        Self {
            store,
            serializer,
            checkpoint_container: checkpoint_container.into(),
            event_container: event_container.into(),
        }
    }
}

#[async_trait]
impl<S> CheckpointReader for StreamCheckpoints<S>
where
    S: DocumentStore,
{
    async fn read<T>(
        &self,
        name: &str,
        stream_id: &StreamId,
        cancellation: &CancellationToken,
    ) -> Result<Option<Checkpoint<T>>, CheckpointError>
    where
        T: DeserializeOwned + Send,
    {
        let partition_key = stream_id.to_string();

        let document = cancellable(
            cancellation,
            self.store.read(&self.checkpoint_container, &partition_key, name),
        )
        .await??;

        let Some(document) = document else {
            return Ok(None);
        };

        let item: Option<Item<Checkpoint<T>>> = self.serializer.decode(document.body)?;

        Ok(item.map(|item| item.body))
    }
}

#[async_trait]
impl<S> CheckpointWriter for StreamCheckpoints<S>
where
    S: DocumentStore,
{
    async fn write<T>(
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
        let (metadata, _) = cancellable(
            cancellation,
            load_metadata::<_, CheckpointError>(
                &self.store,
                &self.serializer,
                &self.event_container,
                stream_id,
            ),
        )
        .await??;

        if position > metadata.current_version {
            return Err(CheckpointError::PositionAhead {
                position,
                current: metadata.current_version,
            });
        }

        if let Some(state) = &state {
            if serde_json::to_value(state).map_err(EncodeError::Json)?.is_null() {
                return Err(EncodeError::NullValue.into());
            }
        }

        let checkpoint = Checkpoint {
            name: name.to_owned(),
            stream_id: stream_id.clone(),
            position,
            timestamp: Utc::now(),
            state,
        };

        let partition_key = stream_id.to_string();
        let body = self.serializer.encode(&Item {
            id: name.to_owned(),
            pk: partition_key.clone(),
            body: &checkpoint,
        })?;

        if cancellation.is_cancelled() {
            return Err(CancelledError.into());
        }

        self.store
            .upsert(&self.checkpoint_container, &partition_key, name, body)
            .await?;

        tracing::debug!(
            checkpoint = name,
            stream_id = %stream_id,
            position,
            "checkpoint recorded"
        );

        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::ItemAdded;
    use crate::event::{Envelope, EventTypeRegistry, StreamBatch};
    use crate::store::InMemory;
    use crate::stream::{BatchWriter, StreamBatchWriter};
    use crate::version::ExpectedVersion;

    const EVENTS: &str = "event-store";
    const CHECKPOINTS: &str = "stream-checkpoints";

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ItemCount {
        total_quantity: u32,
    }

    fn serializer() -> JsonSerializer {
        JsonSerializer::new(
            EventTypeRegistry::new()
                .with::<ItemAdded>("item-added")
                .expect("registry should be built"),
        )
    }

    fn stream_id() -> StreamId {
        StreamId::new("cart", "cart-1").expect("valid stream id")
    }

    async fn checkpoints_with_events(count: u32) -> StreamCheckpoints<InMemory> {
        let store = InMemory::default();
        let events = (1..=count)
            .map(|quantity| {
                Envelope::new(ItemAdded {
                    item_id: "item-1".to_owned(),
                    quantity,
                })
            })
            .collect();

        StreamBatchWriter::new(store.clone(), serializer(), EVENTS)
            .write(
                StreamBatch::new(stream_id(), ExpectedVersion::START_OF_STREAM, events)
                    .expect("batch is not empty"),
                &CancellationToken::new(),
            )
            .await
            .expect("events should be written");

        StreamCheckpoints::new(store, serializer(), CHECKPOINTS, EVENTS)
    }

    #[tokio::test]
    async fn checkpoints_are_replaced_by_later_writes() {
        let checkpoints = checkpoints_with_events(3).await;
        let token = CancellationToken::new();
        let id = stream_id();

        for position in 1..=3 {
            checkpoints
                .write(
                    "cart-totals",
                    &id,
                    position,
                    Some(ItemCount {
                        total_quantity: position as u32,
                    }),
                    &token,
                )
                .await
                .expect("checkpoint should be written");
        }

        let checkpoint = checkpoints
            .read::<ItemCount>("cart-totals", &id, &token)
            .await
            .expect("checkpoint should be read")
            .expect("checkpoint exists");

        assert_eq!(3, checkpoint.position);
        assert_eq!(Some(ItemCount { total_quantity: 3 }), checkpoint.state);
        assert_eq!("cart-totals", checkpoint.name);
    }

    #[tokio::test]
    async fn checkpoints_are_kept_per_consumer() {
        let checkpoints = checkpoints_with_events(2).await;
        let token = CancellationToken::new();
        let id = stream_id();

        checkpoints
            .write::<ItemCount>("first", &id, 2, None, &token)
            .await
            .expect("checkpoint should be written");

        let first = checkpoints
            .read::<ItemCount>("first", &id, &token)
            .await
            .expect("checkpoint should be read")
            .expect("checkpoint exists");

        assert_eq!(2, first.position);
        assert_eq!(None, first.state);

        let second = checkpoints
            .read::<ItemCount>("second", &id, &token)
            .await
            .expect("checkpoint should be read");

        assert!(second.is_none());
    }

    #[tokio::test]
    async fn positions_ahead_of_the_stream_are_rejected() {
        let checkpoints = checkpoints_with_events(2).await;
        let token = CancellationToken::new();
        let id = stream_id();

        let err = checkpoints
            .write::<ItemCount>("cart-totals", &id, 3, None, &token)
            .await
            .expect_err("the stream is at version 2");

        assert!(matches!(
            err,
            CheckpointError::PositionAhead {
                position: 3,
                current: 2
            }
        ));

        let checkpoint = checkpoints
            .read::<ItemCount>("cart-totals", &id, &token)
            .await
            .expect("checkpoint should be read");

        assert!(checkpoint.is_none());
    }

    #[tokio::test]
    async fn cancelled_checkpoint_writes_are_not_recorded() {
        let checkpoints = checkpoints_with_events(1).await;
        let token = CancellationToken::new();
        token.cancel();
        let id = stream_id();

        let err = checkpoints
            .write::<ItemCount>("cart-totals", &id, 1, None, &token)
            .await
            .expect_err("token is cancelled");

        assert!(matches!(err, CheckpointError::Cancelled(_)));

        let checkpoint = checkpoints
            .read::<ItemCount>("cart-totals", &id, &CancellationToken::new())
            .await
            .expect("checkpoint should be read");

        assert!(checkpoint.is_none());
    }

    #[tokio::test]
    async fn cancelled_checkpoint_reads_fail() {
        let checkpoints = checkpoints_with_events(1).await;
        let id = stream_id();

        checkpoints
            .write::<ItemCount>("cart-totals", &id, 1, None, &CancellationToken::new())
            .await
            .expect("checkpoint should be written");

        let token = CancellationToken::new();
        token.cancel();

        let err = checkpoints
            .read::<ItemCount>("cart-totals", &id, &token)
            .await
            .expect_err("token is cancelled");

        assert!(matches!(err, CheckpointError::Cancelled(_)));
    }

    #[tokio::test]
    async fn states_without_content_are_rejected() {
        let checkpoints = checkpoints_with_events(1).await;
        let token = CancellationToken::new();
        let id = stream_id();

        let err = checkpoints
            .write::<Option<u32>>("cart-totals", &id, 1, Some(None), &token)
            .await
            .expect_err("a null state would be read back as no state");

        assert!(matches!(err, CheckpointError::Encode(EncodeError::NullValue)));

        let checkpoint = checkpoints
            .read::<Option<u32>>("cart-totals", &id, &token)
            .await
            .expect("checkpoint should be read");

        assert!(checkpoint.is_none());
    }

    #[tokio::test]
    async fn states_are_opaque_to_the_store() {
        // No Default, Clone or PartialEq for the state: only serde is required.
        #[derive(Debug, Serialize, Deserialize)]
        struct Cursor {
            last_seen: String,
        }

        let checkpoints = checkpoints_with_events(1).await;
        let token = CancellationToken::new();
        let id = stream_id();

        checkpoints
            .write(
                "cursor",
                &id,
                1,
                Some(Cursor {
                    last_seen: "item-1".to_owned(),
                }),
                &token,
            )
            .await
            .expect("checkpoint should be written");

        let checkpoint = checkpoints
            .read::<Cursor>("cursor", &id, &token)
            .await
            .expect("checkpoint should be read")
            .expect("checkpoint exists");

        assert_eq!(
            Some("item-1"),
            checkpoint.state.as_ref().map(|cursor| cursor.last_seen.as_str())
        );
    }
}
