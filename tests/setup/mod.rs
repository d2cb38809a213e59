#![allow(dead_code)]

use async_trait::async_trait;
use eventually_docstore::event::{Envelope, EventTypeRegistry, StreamBatch};
use eventually_docstore::store::{Document, DocumentStore, ETag, InMemory, Operation, StoreError};
use eventually_docstore::stream::StreamId;
use eventually_docstore::version::ExpectedVersion;
use eventually_docstore::{Config, EventStore};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOpened {
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyDeposited {
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionState {
    pub count: u32,
}

lazy_static! {
    static ref TRACING: () = {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    };
}

/// Installs the test tracing subscriber, once for the whole test binary.
pub fn init_tracing() {
    lazy_static::initialize(&TRACING);
}

pub fn registry() -> EventTypeRegistry {
    EventTypeRegistry::new()
        .with::<AccountOpened>("account-opened")
        .and_then(|registry| registry.with::<MoneyDeposited>("money-deposited"))
        .expect("test registry should be built")
}

pub fn event_store() -> (InMemory, EventStore<InMemory>) {
    init_tracing();

    let store = InMemory::default();
    let event_store = EventStore::new(store.clone(), registry(), Config::default());

    (store, event_store)
}

pub fn stream_id(name: &str) -> StreamId {
    StreamId::new("accounts", name).expect("test stream id should be valid")
}

pub fn deposits(amounts: impl IntoIterator<Item = u64>) -> Vec<Envelope> {
    amounts
        .into_iter()
        .map(|amount| Envelope::new(MoneyDeposited { amount }))
        .collect()
}

pub fn batch(
    stream_id: &StreamId,
    expected_version: impl Into<ExpectedVersion>,
    events: Vec<Envelope>,
) -> StreamBatch {
    StreamBatch::new(stream_id.clone(), expected_version, events)
        .expect("test batch should not be empty")
}

/// A [`DocumentStore`] whose every request fails, as an unreachable database would.
#[derive(Debug, Clone, Default)]
pub struct UnavailableStore;

impl UnavailableStore {
    fn error() -> StoreError {
        StoreError::Backend(anyhow::anyhow!("service unavailable, retry later"))
    }
}

#[async_trait]
impl DocumentStore for UnavailableStore {
    async fn read(&self, _: &str, _: &str, _: &str) -> Result<Option<Document>, StoreError> {
        Err(Self::error())
    }

    async fn query(&self, _: &str, _: &str) -> Result<Vec<Document>, StoreError> {
        Err(Self::error())
    }

    async fn upsert(&self, _: &str, _: &str, _: &str, _: Vec<u8>) -> Result<ETag, StoreError> {
        Err(Self::error())
    }

    async fn execute_batch(
        &self,
        _: &str,
        _: &str,
        _: Vec<Operation>,
    ) -> Result<(), StoreError> {
        Err(Self::error())
    }
}
