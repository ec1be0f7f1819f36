//! Typed caches over the key-value store.

use std::sync::Arc;

use electrum_primitives::plain::{PlainBlockHeader, PlainTransaction};

use crate::{Column, KeyValueStore, MemoryStore, StoreError};

/// Height-keyed block header cache shared by client instances.
#[derive(Clone)]
pub struct BlockStore {
    store: Arc<dyn KeyValueStore>,
}

impl BlockStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn get(&self, height: i32) -> Result<Option<PlainBlockHeader>, StoreError> {
        let Some(bytes) = self.store.get(Column::BlockHeader, &height.to_be_bytes())? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| StoreError::Codec(err.to_string()))
    }

    pub fn put(&self, header: &PlainBlockHeader) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec(header).map_err(|err| StoreError::Codec(err.to_string()))?;
        self.store
            .put(Column::BlockHeader, &header.block_height.to_be_bytes(), &bytes)
    }

    pub fn contains(&self, height: i32) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get(Column::BlockHeader, &height.to_be_bytes())?
            .is_some())
    }
}

/// Txid-keyed transaction cache shared by client instances.
#[derive(Clone)]
pub struct TransactionStore {
    store: Arc<dyn KeyValueStore>,
}

impl TransactionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn get(&self, transaction_hash: &str) -> Result<Option<PlainTransaction>, StoreError> {
        let Some(bytes) = self
            .store
            .get(Column::Transaction, transaction_hash.as_bytes())?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| StoreError::Codec(err.to_string()))
    }

    pub fn put(&self, transaction: &PlainTransaction) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec(transaction).map_err(|err| StoreError::Codec(err.to_string()))?;
        self.store.put(
            Column::Transaction,
            transaction.transaction_hash.as_bytes(),
            &bytes,
        )
    }

    pub fn contains(&self, transaction_hash: &str) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get(Column::Transaction, transaction_hash.as_bytes())?
            .is_some())
    }
}
