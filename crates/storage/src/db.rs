use chrono::NaiveDateTime;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tally_core::{
    CommitError, LedgerEntry, LedgerError, LedgerWriter, Money, NewLedgerEntry, RecurringSeries,
    SeriesId, TransactionKind,
};
use tracing::{debug, warn};

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;
    configure(&pool).await?;

    Ok(pool)
}

/// A private database that lives as long as the pool's single connection.
pub async fn create_in_memory() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    configure(&pool).await?;
    Ok(pool)
}

async fn configure(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;
    run_migrations(pool).await
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recurring_series (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            category TEXT,
            expected_amount_cents INTEGER,
            payee_phone TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            kind TEXT NOT NULL,
            payee TEXT,
            phone_number TEXT,
            category TEXT,
            series_id INTEGER,
            reference TEXT NOT NULL,
            source_hash TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (owner, source_hash),
            FOREIGN KEY (series_id) REFERENCES recurring_series(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ledger_entries_owner_time ON ledger_entries (owner, occurred_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

type LedgerRow = (
    i64,
    NaiveDateTime,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
    String,
    Option<String>,
);

fn ledger_entry(r: LedgerRow) -> Result<LedgerEntry, sqlx::Error> {
    let kind = TransactionKind::from_str(&r.3).map_err(|e| sqlx::Error::Decode(e.into()))?;
    Ok(LedgerEntry {
        id: r.0,
        occurred_at: r.1,
        amount: Money::from_cents(r.2),
        kind,
        payee: r.4,
        phone_number: r.5,
        category: r.6,
        series_id: r.7.map(SeriesId),
        reference: r.8,
        source_hash: r.9,
    })
}

/// The owner's ledger, newest first.
pub async fn load_history(pool: &DbPool, owner: &str) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        "SELECT id, occurred_at, amount_cents, kind, payee, phone_number, category, series_id, reference, source_hash \
         FROM ledger_entries WHERE owner = ? ORDER BY occurred_at DESC, id DESC",
    )
    .bind(owner)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ledger_entry).collect()
}

pub async fn load_recurring_series(
    pool: &DbPool,
    owner: &str,
) -> Result<Vec<RecurringSeries>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, Option<String>, Option<i64>, Option<String>)>(
        "SELECT id, name, category, expected_amount_cents, payee_phone FROM recurring_series WHERE owner = ? ORDER BY id",
    )
    .bind(owner)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| RecurringSeries {
            id: SeriesId(r.0),
            name: r.1,
            category: r.2,
            expected_amount: r.3.map(Money::from_cents),
            payee_phone: r.4,
        })
        .collect())
}

pub async fn insert_recurring_series(
    pool: &DbPool,
    owner: &str,
    name: &str,
    category: Option<&str>,
    expected_amount: Option<Money>,
    payee_phone: Option<&str>,
) -> Result<SeriesId, sqlx::Error> {
    let expected_cents = match expected_amount {
        Some(amount) => Some(amount.to_cents().ok_or_else(|| {
            sqlx::Error::Encode(format!("expected amount {amount} is too large to store").into())
        })?),
        None => None,
    };
    let result = sqlx::query(
        "INSERT INTO recurring_series (owner, name, category, expected_amount_cents, payee_phone) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(owner)
    .bind(name)
    .bind(category)
    .bind(expected_cents)
    .bind(payee_phone)
    .execute(pool)
    .await?;

    Ok(SeriesId(result.last_insert_rowid()))
}

/// Ledger of one owner in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: DbPool,
    owner: String,
}

impl SqliteLedger {
    pub fn new(pool: DbPool, owner: &str) -> Self {
        SqliteLedger {
            pool,
            owner: owner.to_string(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn history(&self) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        load_history(&self.pool, &self.owner).await
    }

    pub async fn recurring_series(&self) -> Result<Vec<RecurringSeries>, sqlx::Error> {
        load_recurring_series(&self.pool, &self.owner).await
    }

    /// Inserts inside one transaction; dropping `tx` on error rolls back.
    async fn insert_all(&self, entries: &[NewLedgerEntry]) -> Result<Vec<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(entries.len());

        for entry in entries {
            let result = sqlx::query(
                "INSERT INTO ledger_entries \
                 (owner, occurred_at, amount_cents, kind, payee, phone_number, category, series_id, reference, source_hash) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&self.owner)
            .bind(entry.occurred_at)
            .bind(entry.amount.to_cents())
            .bind(entry.kind.as_str())
            .bind(&entry.payee)
            .bind(&entry.phone_number)
            .bind(&entry.category)
            .bind(entry.series_id.map(|s| s.0))
            .bind(&entry.reference)
            .bind(&entry.source_hash)
            .execute(&mut *tx)
            .await?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;
        Ok(ids)
    }
}

impl LedgerWriter for SqliteLedger {
    async fn write_entries(&self, entries: &[NewLedgerEntry]) -> Result<Vec<i64>, CommitError> {
        if let Some(entry) = entries.iter().find(|e| e.amount.to_cents().is_none()) {
            warn!(owner = %self.owner, amount = %entry.amount, "ledger batch refused");
            return Err(LedgerError::AmountOutOfRange(entry.amount).into());
        }
        match self.insert_all(entries).await {
            Ok(ids) => {
                debug!(owner = %self.owner, written = ids.len(), "ledger entries stored");
                Ok(ids)
            }
            Err(e) => {
                warn!(owner = %self.owner, error = %e, "ledger batch rolled back");
                Err(CommitError::Storage(e.to_string()))
            }
        }
    }
}
