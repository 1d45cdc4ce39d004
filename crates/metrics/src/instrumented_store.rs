use std::time::Instant;

use async_trait::async_trait;
use ledger_store::{NewTransaction, Result, Transaction, TransactionStore};

use crate::definitions::{STORE_INSERT_DURATION, STORE_LIST_DURATION};

/// Transparent wrapper around a [`TransactionStore`] that records call
/// latencies into Prometheus histograms. Failed calls are timed as well.
pub struct InstrumentedStore<S> {
    inner: S,
}

impl<S> InstrumentedStore<S> {
    pub fn new(store: S) -> Self {
        Self { inner: store }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: TransactionStore> TransactionStore for InstrumentedStore<S> {
    async fn list(&self) -> Result<Vec<Transaction>> {
        let start = Instant::now();
        let result = self.inner.list().await;
        STORE_LIST_DURATION.observe(start.elapsed().as_secs_f64());
        result
    }

    async fn insert(&self, candidate: NewTransaction) -> Result<Transaction> {
        let start = Instant::now();
        let result = self.inner.insert(candidate).await;
        STORE_INSERT_DURATION.observe(start.elapsed().as_secs_f64());
        result
    }
}

#[cfg(test)]
mod tests {
    use ledger_store::MemoryTransactionStore;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn records_latency_and_delegates() {
        let store = InstrumentedStore::new(MemoryTransactionStore::new());
        let inserts_before = STORE_INSERT_DURATION.get_sample_count();
        let lists_before = STORE_LIST_DURATION.get_sample_count();

        let created = store
            .insert(NewTransaction {
                from_id: Uuid::new_v4(),
                to_id: Uuid::new_v4(),
                amount: 3.5,
            })
            .await
            .unwrap();
        let listed = store.list().await.unwrap();

        assert_eq!(listed, vec![created]);
        assert_eq!(store.inner().list().await.unwrap().len(), 1);
        assert!(STORE_INSERT_DURATION.get_sample_count() > inserts_before);
        assert!(STORE_LIST_DURATION.get_sample_count() > lists_before);
    }
}
