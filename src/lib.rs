//! `eventually-docstore` is an Event Store for Event-sourced applications,
//! built on top of a partitioned document database.
//!
//! Every Event Stream is kept in its own partition, as one document per
//! Domain Event plus a [`StreamMetadata`][stream::StreamMetadata] document.
//! Batches of events are appended atomically with optimistic concurrency
//! control, and named consumers can record [Checkpoint][stream::Checkpoint]s
//! of their progress on a Stream.
//!
//! ## Usage
//!
//! Register the Domain Event types in an [`EventTypeRegistry`][event::EventTypeRegistry],
//! then create an [`EventStore`] over a [`DocumentStore`][store::DocumentStore]
//! implementation:
//!
//! ```
//! use eventually_docstore::event::{Envelope, EventTypeRegistry, StreamBatch};
//! use eventually_docstore::store::InMemory;
//! use eventually_docstore::stream::StreamId;
//! use eventually_docstore::version::ExpectedVersion;
//! use eventually_docstore::{Config, EventStore};
//! use serde::{Deserialize, Serialize};
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct AccountOpened {
//!     owner: String,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let registry = EventTypeRegistry::new().with::<AccountOpened>("account-opened")?;
//! let event_store = EventStore::new(InMemory::default(), registry, Config::default());
//!
//! let stream_id = StreamId::new("accounts", "account-1")?;
//! let batch = StreamBatch::new(
//!     stream_id,
//!     ExpectedVersion::START_OF_STREAM,
//!     vec![Envelope::new(AccountOpened {
//!         owner: "jane".to_owned(),
//!     })],
//! )?;
//!
//! let metadata = event_store
//!     .write_to_stream(batch, &CancellationToken::new())
//!     .await?;
//!
//! assert_eq!(1, metadata.current_version);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code, trivial_casts)]
#![warn(missing_docs, unused_qualifications)]
#![deny(clippy::all)]

pub mod client;
pub mod config;
pub mod event;
pub mod serde;
pub mod store;
pub mod stream;
pub mod tracing;
pub mod version;

pub use client::EventStore;
pub use config::Config;
