use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::{NewTransaction, Result, Transaction, TransactionStore};

/// Process-local store used for tests and database-less runs.
///
/// Ids start at 1 and grow by one per insert, matching a `BIGSERIAL` key.
#[derive(Debug, Default)]
pub struct MemoryTransactionStore {
    rows: Mutex<Vec<Transaction>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn list(&self) -> Result<Vec<Transaction>> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.clone())
    }

    async fn insert(&self, candidate: NewTransaction) -> Result<Transaction> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let id = rows.last().map_or(1, |last| last.id + 1);
        let tx = candidate.into_transaction(id, Utc::now());
        rows.push(tx.clone());
        Ok(tx)
    }
}
