use crate::db::changes::{
    fetch_record, write_record, Record, RowStatus, TransactionRecord, WriteMode,
};
use crate::db::{Db, Table, TransactionQuery, WriteTx};
use crate::model::Transaction;
use crate::utils::format_date;
use crate::{Error, Result};
use tracing::debug;

/// Writes `transactions` into an open write transaction. Returns how many rows were actually
/// inserted, which with `InsertOrIgnore` excludes ids that already existed.
pub(super) async fn insert_all(
    tx: &mut WriteTx,
    transactions: &[Transaction],
    mode: WriteMode,
) -> Result<usize> {
    let revision = tx.revision();
    let mut inserted = 0;
    for t in transactions {
        let written = write_record(
            tx.conn(),
            &TransactionRecord::from(t),
            mode,
            RowStatus::Created,
            revision,
        )
        .await?;
        if written {
            inserted += 1;
        }
    }
    if inserted > 0 {
        tx.touch(Table::Transactions);
    }
    Ok(inserted)
}

impl Db {
    pub async fn create_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.create_transactions(std::slice::from_ref(transaction))
            .await
            .map(|_| ())
    }

    /// Stores all of `transactions` or none of them.
    pub async fn create_transactions(&self, transactions: &[Transaction]) -> Result<usize> {
        for t in transactions {
            t.validate()?;
        }
        let mut tx = self.begin_write().await?;
        let inserted = insert_all(&mut tx, transactions, WriteMode::Insert).await?;
        tx.commit().await?;
        debug!("Created {inserted} transaction(s)");
        Ok(inserted)
    }

    pub async fn find_transaction(&self, id: &str) -> Result<Transaction> {
        let mut conn = self.pool().acquire().await?;
        fetch_record::<TransactionRecord>(&mut conn, id)
            .await?
            .ok_or_else(|| Error::not_found("transaction", id))?
            .try_into()
    }

    /// Loads the transaction, applies `mutator` and stores the result in one write transaction.
    /// The id cannot be changed.
    pub async fn update_transaction<F>(&self, id: &str, mutator: F) -> Result<Transaction>
    where
        F: FnOnce(&mut Transaction) + Send,
    {
        let mut tx = self.begin_write().await?;
        let revision = tx.revision();
        let current: Transaction = fetch_record::<TransactionRecord>(tx.conn(), id)
            .await?
            .ok_or_else(|| Error::not_found("transaction", id))?
            .try_into()?;

        let mut next = current.clone();
        mutator(&mut next);
        if next.id != current.id {
            return Err(Error::invalid(
                "id",
                "the id of a transaction cannot be changed",
            ));
        }
        next.validate()?;

        write_record(
            tx.conn(),
            &TransactionRecord::from(&next),
            WriteMode::Upsert,
            RowStatus::Updated,
            revision,
        )
        .await?;
        tx.touch(Table::Transactions);
        tx.commit().await?;
        Ok(next)
    }

    /// Sets or clears the soft-delete flag.
    pub async fn hide_transaction(&self, id: &str, hidden: bool) -> Result<Transaction> {
        self.update_transaction(id, |t| t.hidden = hidden).await
    }

    /// Transactions matching `query`, ordered by date descending (ties broken by id descending).
    pub async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions \
            WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date <= ?2) \
            AND (?3 OR hidden = 0) \
            ORDER BY date DESC, id DESC",
            TransactionRecord::COLUMNS.join(", ")
        );
        let rows = sqlx::query(&sql)
            .bind(query.start.map(format_date))
            .bind(query.end.map(format_date))
            .bind(query.include_hidden)
            .fetch_all(self.pool())
            .await?;
        rows.iter()
            .map(|row| TransactionRecord::from_row(row).and_then(Transaction::try_from))
            .collect()
    }

    /// The number of stored transactions, hidden ones included.
    pub async fn transaction_count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions")
            .fetch_one(self.pool())
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
