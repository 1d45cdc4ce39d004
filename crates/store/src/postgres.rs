use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::{Error, NewTransaction, Result, Transaction, TransactionStore};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id          BIGSERIAL PRIMARY KEY,
        from_id     UUID NOT NULL,
        to_id       UUID NOT NULL,
        amount      DOUBLE PRECISION NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

const SELECT_ALL: &str =
    "SELECT id, from_id, to_id, amount, created_at FROM transactions ORDER BY id ASC";

const INSERT: &str = r#"
    INSERT INTO transactions (from_id, to_id, amount)
    VALUES ($1, $2, $3)
    RETURNING id, created_at
"#;

/// [`TransactionStore`] backed by a PostgreSQL connection pool.
///
/// Every call checks a connection out of the pool for the duration of a
/// single statement; the pool size is the only throttle on concurrent work.
#[derive(Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    /// Open a pool, verify connectivity and create the `transactions` table
    /// if it does not exist yet.
    pub async fn connect(options: PgConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let store = Self::from_pool(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        info!("transactions table ready");
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn list(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(SELECT_ALL).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn insert(&self, candidate: NewTransaction) -> Result<Transaction> {
        let row = sqlx::query(INSERT)
            .bind(candidate.from_id)
            .bind(candidate.to_id)
            .bind(candidate.amount)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        let id: i64 = row.try_get("id").map_err(decode_err)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode_err)?;
        Ok(candidate.into_transaction(id, created_at))
    }
}

fn decode_row(row: &PgRow) -> Result<Transaction> {
    Ok(Transaction {
        id: row.try_get("id").map_err(decode_err)?,
        from_id: row.try_get::<Uuid, _>("from_id").map_err(decode_err)?,
        to_id: row.try_get::<Uuid, _>("to_id").map_err(decode_err)?,
        amount: row.try_get("amount").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn decode_err(e: sqlx::Error) -> Error {
    Error::Decode(e.to_string())
}

/// Split unique-key violations (SQLSTATE 23505) from every other failure.
fn classify(e: sqlx::Error) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => Error::Conflict(e.to_string()),
        _ => Error::Db(e),
    }
}
