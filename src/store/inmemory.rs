//! Contains the [`InMemory`] implementation of the [`DocumentStore`] trait,
//! backed by a thread-safe [`std::collections::HashMap`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::store::{Document, DocumentStore, ETag, Operation, StoreError};

type PartitionAddress = (String, String);

#[derive(Debug, Default)]
struct InMemoryBackend {
    partitions: HashMap<PartitionAddress, BTreeMap<String, Document>>,
    last_etag: u64,
}

impl InMemoryBackend {
    fn next_etag(&mut self) -> ETag {
        self.last_etag += 1;
        ETag::new(format!("{:016x}", self.last_etag))
    }

    fn store(&mut self, address: PartitionAddress, id: String, body: Vec<u8>) -> ETag {
        let etag = self.next_etag();

        self.partitions.entry(address).or_default().insert(
            id.clone(),
            Document {
                id,
                body,
                etag: etag.clone(),
            },
        );

        etag
    }
}

fn address(container: &str, partition_key: &str) -> PartitionAddress {
    (container.to_owned(), partition_key.to_owned())
}

/// In-memory implementation of the [`DocumentStore`] trait.
///
/// Cloning an [`InMemory`] store returns a handle to the same documents.
/// Transactional batches are applied under a single write lock, which makes
/// them atomic with respect to every other operation.
#[derive(Debug, Clone, Default)]
pub struct InMemory {
    backend: Arc<RwLock<InMemoryBackend>>,
}

impl InMemory {
    /// Returns the number of documents stored in the partition.
    pub fn count(&self, container: &str, partition_key: &str) -> usize {
        self.backend
            .read()
            .partitions
            .get(&address(container, partition_key))
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for InMemory {
    async fn read(
        &self,
        container: &str,
        partition_key: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .backend
            .read()
            .partitions
            .get(&address(container, partition_key))
            .and_then(|partition| partition.get(id))
            .cloned())
    }

    async fn query(
        &self,
        container: &str,
        partition_key: &str,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .backend
            .read()
            .partitions
            .get(&address(container, partition_key))
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert(
        &self,
        container: &str,
        partition_key: &str,
        id: &str,
        body: Vec<u8>,
    ) -> Result<ETag, StoreError> {
        Ok(self
            .backend
            .write()
            .store(address(container, partition_key), id.to_owned(), body))
    }

    async fn execute_batch(
        &self,
        container: &str,
        partition_key: &str,
        operations: Vec<Operation>,
    ) -> Result<(), StoreError> {
        let address = address(container, partition_key);
        let mut backend = self.backend.write();

        // Validate every precondition first, so that a failure leaves the partition untouched.
        {
            let partition = backend.partitions.get(&address);
            let mut written = HashSet::new();

            for (index, operation) in operations.iter().enumerate() {
                let id = operation.id();
                let existing = partition.and_then(|partition| partition.get(id));

                let satisfied = written.insert(id)
                    && match operation {
                        Operation::Create { .. } => existing.is_none(),
                        Operation::Replace { if_match, .. } => {
                            existing.map_or(false, |document| &document.etag == if_match)
                        }
                        Operation::Upsert { .. } => true,
                    };

                if !satisfied {
                    return Err(StoreError::PreconditionFailed {
                        index,
                        id: id.to_owned(),
                    });
                }
            }
        }

        for operation in operations {
            let (id, body) = operation.into_parts();
            backend.store(address.clone(), id, body);
        }

        Ok(())
    }
}
