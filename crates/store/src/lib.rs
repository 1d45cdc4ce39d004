mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryTransactionStore;
pub use postgres::PgTransactionStore;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store rejected the write because of a uniqueness violation.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Db(#[from] sqlx::Error),

    #[error("failed to decode transaction row: {0}")]
    Decode(String),
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A money transfer between two ledger participants.
///
/// `id` and `created_at` are assigned by the store on insert and never
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// A validated transfer that has not been persisted yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewTransaction {
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub amount: f64,
}

impl NewTransaction {
    fn into_transaction(self, id: i64, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            from_id: self.from_id,
            to_id: self.to_id,
            amount: self.amount,
            created_at,
        }
    }
}

/// Append-only persistence for [`Transaction`] records.
///
/// Implementations assign `id` in increasing order and stamp `created_at`
/// at insertion time. Neither call retries.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// All transactions ordered by ascending `id`.
    async fn list(&self) -> Result<Vec<Transaction>>;

    /// Persist `candidate` and return it with the store-assigned fields.
    async fn insert(&self, candidate: NewTransaction) -> Result<Transaction>;
}
