//! Contains the [`DocumentStore`] interface, the boundary between this crate
//! and the partitioned document database holding Event Streams and Checkpoints.
//!
//! Documents live in named containers, and within a container they are grouped
//! by partition key. All the operations used by this crate target a single partition.

use std::fmt::{Display, Formatter, Result as FmtResult};

use async_trait::async_trait;

pub mod inmemory;

pub use inmemory::InMemory;

/// Opaque version tag of a stored document, changed by every write to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    /// Creates a new [`ETag`] from the value returned by the store.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the tag value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ETag {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// A document read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Id of the document, unique within its partition.
    pub id: String,

    /// The raw document content.
    pub body: Vec<u8>,

    /// The current version tag of the document.
    pub etag: ETag,
}

/// A single write in a transactional batch, see [`DocumentStore::execute_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Creates the document, failing if a document with the same id exists.
    Create {
        /// Id of the document.
        id: String,
        /// Content of the document.
        body: Vec<u8>,
    },

    /// Replaces the document, failing unless it exists with the given [`ETag`].
    Replace {
        /// Id of the document.
        id: String,
        /// New content of the document.
        body: Vec<u8>,
        /// The [`ETag`] the document must currently have.
        if_match: ETag,
    },

    /// Creates or replaces the document, unconditionally.
    Upsert {
        /// Id of the document.
        id: String,
        /// Content of the document.
        body: Vec<u8>,
    },
}

impl Operation {
    /// Id of the document targeted by the operation.
    pub fn id(&self) -> &str {
        match self {
            Operation::Create { id, .. }
            | Operation::Replace { id, .. }
            | Operation::Upsert { id, .. } => id,
        }
    }

    pub(crate) fn into_parts(self) -> (String, Vec<u8>) {
        match self {
            Operation::Create { id, body }
            | Operation::Replace { id, body, .. }
            | Operation::Upsert { id, body } => (id, body),
        }
    }
}

/// All possible error types returned by a [`DocumentStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An operation of a transactional batch failed its precondition,
    /// so the whole batch has been rejected.
    #[error("precondition failed for document '{id}' in batch operation {index}")]
    PreconditionFailed {
        /// Position of the failed operation within the batch.
        index: usize,
        /// Id of the document targeted by the failed operation.
        id: String,
    },

    /// Any other failure of the store, such as timeouts, throttling or
    /// connectivity issues. These are returned unchanged, without retries.
    #[error("document store request failed: {0}")]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
/// Interface of a partitioned document database.
///
/// Implementations must be safe to share between tasks, and must execute
/// [`DocumentStore::execute_batch`] atomically: either every operation is
/// applied, or none is.
pub trait DocumentStore: Send + Sync {
    /// Reads a single document, returning `None` if it does not exist.
    async fn read(
        &self,
        container: &str,
        partition_key: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Returns all the documents of a partition, in no particular order.
    async fn query(&self, container: &str, partition_key: &str)
        -> Result<Vec<Document>, StoreError>;

    /// Creates or replaces a document, returning its new [`ETag`].
    async fn upsert(
        &self,
        container: &str,
        partition_key: &str,
        id: &str,
        body: Vec<u8>,
    ) -> Result<ETag, StoreError>;

    /// Applies all the operations to the partition as a single atomic unit.
    ///
    /// If any operation fails its precondition, nothing is written and
    /// [`StoreError::PreconditionFailed`] is returned.
    async fn execute_batch(
        &self,
        container: &str,
        partition_key: &str,
        operations: Vec<Operation>,
    ) -> Result<(), StoreError>;
}
