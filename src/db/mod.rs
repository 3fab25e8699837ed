//! This module is responsible for reading, writing and managing the SQLite database.
//!
//! All writes go through a `WriteTx`, which holds the store-wide writer lock for its whole
//! lifetime, so write transactions never interleave. Readers use other pool connections and see
//! the last committed state (the database runs in WAL mode). Subscribers are told about a write
//! only after it has committed.

mod categories;
mod changes;
mod migrations;
mod recurring;
mod state;
mod subscriptions;
mod transactions;
mod users;

pub use changes::{
    CategoryRecord, ChangeSet, PendingChanges, PullResponse, SentRow, TableChanges,
    TransactionRecord, UserRecord,
};
pub use subscriptions::{CategoryQuery, LiveQuery, LiveSource, TransactionQuery};

use crate::{utils, Error, Result};
use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use subscriptions::Subscriptions;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

/// The schema version this build of the program expects.
const CURRENT_VERSION: i32 = 2;

/// The tables whose changes subscribers can observe.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Table {
    Categories,
    Transactions,
    Users,
    State,
    RecurringTransactions,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Categories => "categories",
            Table::Transactions => "transactions",
            Table::Users => "users",
            Table::State => "state",
            Table::RecurringTransactions => "recurring_transactions",
        }
    }
}

/// A handle to the local store. Cloning is cheap and all clones share the pool, the writer lock
/// and the subscription registry.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    subscriptions: Arc<Subscriptions>,
}

impl Db {
    /// - Validates that there is a SQLite file at `path`
    /// - Updates the database schema with migrations if it is out-of-date
    /// - Returns a constructed `Db` object for further operations
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(anyhow::anyhow!(
                "The SQLite database is missing '{}'",
                path.display()
            )
            .into());
        }
        Self::open(path, false).await
    }

    /// - Validates that no file currently exists at `path`
    /// - Creates a new SQLite file at `path` and initializes the schema
    /// - Returns a constructed `Db` object for further operations
    pub async fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(anyhow::anyhow!(
                "A SQLite database already exists at '{}'",
                path.display()
            )
            .into());
        }
        Self::open(path, true).await
    }

    async fn open(path: &Path, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .context("Failed to parse SQLite connection string")?
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;

        bootstrap_schema_version(&pool).await?;
        let current = schema_version(&pool).await?;
        migrations::run(&pool, current, CURRENT_VERSION).await?;

        let db = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            subscriptions: Arc::new(Subscriptions::default()),
        };
        db.ensure_app_state(utils::today()).await?;
        debug!("Opened database at {}", path.display());
        Ok(db)
    }

    /// Returns the version recorded in the `schema_version` table.
    pub async fn schema_version(&self) -> Result<i32> {
        schema_version(&self.pool).await
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts the single write transaction. Waits for any write in flight to finish first.
    pub(crate) async fn begin_write(&self) -> Result<WriteTx> {
        let guard = self.write_lock.clone().lock_owned().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE sync_meta SET revision = revision + 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        let (revision,): (i64,) = sqlx::query_as("SELECT revision FROM sync_meta WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?;
        trace!("Began write transaction at revision {revision}");
        Ok(WriteTx {
            tx,
            revision,
            touched: BTreeSet::new(),
            subscriptions: self.subscriptions.clone(),
            _guard: guard,
        })
    }
}

/// An open write transaction. Dropping it without calling `commit` rolls everything back and
/// notifies nobody.
pub(crate) struct WriteTx {
    tx: sqlx::Transaction<'static, Sqlite>,
    revision: i64,
    touched: BTreeSet<Table>,
    subscriptions: Arc<Subscriptions>,
    _guard: OwnedMutexGuard<()>,
}

impl WriteTx {
    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// The revision stamped on every row this transaction writes.
    pub(crate) fn revision(&self) -> i64 {
        self.revision
    }

    /// Records that `table` changed so that its subscribers are notified after commit.
    pub(crate) fn touch(&mut self, table: Table) {
        self.touched.insert(table);
    }

    pub(crate) async fn commit(self) -> Result<()> {
        let WriteTx {
            tx,
            touched,
            subscriptions,
            _guard,
            ..
        } = self;
        tx.commit().await?;
        subscriptions.notify(&touched);
        Ok(())
    }
}

async fn bootstrap_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await
        .context("Failed to create schema_version table")?;
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_version")
        .fetch_one(pool)
        .await?;
    if count == 0 {
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(pool)
            .await
            .context("Failed to insert initial schema version")?;
    }
    Ok(())
}

async fn schema_version(pool: &SqlitePool) -> Result<i32> {
    let (version,): (i32,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(Error::from)?;
    Ok(version)
}
