//! Raw row records, the generic SQL used to read and write them, and the change-log that the
//! sync engine pulls into and pushes out of the store.
//!
//! Each syncable table has a record type whose fields are the table's columns, spelled the same
//! way on the wire. `Record` is the explicit mapping between a struct and its table; the domain
//! types in `crate::model` convert to and from these records.

use crate::db::{Db, Table};
use crate::model::{Category, Currency, Kind, Money, Settings, Transaction, User};
use crate::utils::{format_date, parse_date, validate_id};
use crate::{Error, Result};
use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection};
use std::str::FromStr;
use tracing::{debug, trace};

pub(crate) type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Maps a struct onto the columns of a syncable table. `COLUMNS` lists the data columns in the
/// order `bind` binds them; the bookkeeping columns `_status` and `_revision` are not included.
pub(crate) trait Record: Sized + Send + Sync {
    const TABLE: Table;
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> &str;

    fn from_row(row: &SqliteRow) -> Result<Self>;

    fn bind<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;

    /// Rejects records that would break store invariants if written.
    fn check(&self) -> Result<()> {
        validate_id(self.id())
    }
}

/// The sync bookkeeping state of a row.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum RowStatus {
    /// Created locally and never pushed.
    Created,
    /// Changed locally since the last push.
    Updated,
    /// Identical to what the server has.
    Synced,
}

impl RowStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Created => "created",
            RowStatus::Updated => "updated",
            RowStatus::Synced => "synced",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum WriteMode {
    /// Fails if the id already exists.
    Insert,
    /// Leaves an existing row with the same id untouched.
    InsertOrIgnore,
    /// Replaces an existing row. A row that was created locally and never pushed stays `created`
    /// when it is updated locally.
    Upsert,
}

fn write_sql<R: Record>(mode: WriteMode) -> String {
    let table = R::TABLE.name();
    let mut columns: Vec<&str> = R::COLUMNS.to_vec();
    columns.extend(["_status", "_revision"]);
    let placeholders = vec!["?"; columns.len()].join(", ");
    let verb = match mode {
        WriteMode::InsertOrIgnore => "INSERT OR IGNORE",
        WriteMode::Insert | WriteMode::Upsert => "INSERT",
    };
    let mut sql = format!(
        "{verb} INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    if mode == WriteMode::Upsert {
        let assignments = R::COLUMNS
            .iter()
            .filter(|c| **c != "id")
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(
            " ON CONFLICT(id) DO UPDATE SET {assignments}, \
            _status = CASE WHEN excluded._status = 'updated' AND {table}._status = 'created' \
            THEN 'created' ELSE excluded._status END, \
            _revision = excluded._revision"
        ));
    }
    sql
}

/// Writes `record` stamped with `status` and `revision`. Returns whether a row was written.
pub(crate) async fn write_record<R: Record>(
    conn: &mut SqliteConnection,
    record: &R,
    mode: WriteMode,
    status: RowStatus,
    revision: i64,
) -> Result<bool> {
    let sql = write_sql::<R>(mode);
    let result = record
        .bind(sqlx::query(&sql))
        .bind(status.as_str())
        .bind(revision)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn fetch_record<R: Record>(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<R>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?",
        R::COLUMNS.join(", "),
        R::TABLE.name()
    );
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(R::from_row).transpose()
}

fn decimal(s: &str) -> Result<Decimal> {
    Ok(Decimal::from_str(s).with_context(|| format!("Unable to parse the amount '{s}'"))?)
}

fn kind(s: &str) -> Result<Kind> {
    Ok(Kind::from_str(s).with_context(|| format!("Unknown kind '{s}'"))?)
}

fn tags_from_json(s: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(s).with_context(|| format!("Unable to parse the tags '{s}'"))?)
}

pub(crate) fn tags_to_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

// categories ------------------------------------------------------------------------------------

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub kind: Kind,
    pub color: String,
    #[serde(default)]
    pub hidden: bool,
}

impl Record for CategoryRecord {
    const TABLE: Table = Table::Categories;
    const COLUMNS: &'static [&'static str] = &["id", "name", "icon", "kind", "color", "hidden"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            icon: row.try_get("icon")?,
            kind: kind(row.try_get("kind")?)?,
            color: row.try_get("color")?,
            hidden: row.try_get("hidden")?,
        })
    }

    fn bind<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id.as_str())
            .bind(self.name.as_str())
            .bind(self.icon.as_str())
            .bind(self.kind.to_string())
            .bind(self.color.as_str())
            .bind(self.hidden)
    }
}

impl From<&Category> for CategoryRecord {
    fn from(c: &Category) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            icon: c.icon.clone(),
            kind: c.kind,
            color: c.color.clone(),
            hidden: c.hidden,
        }
    }
}

impl From<CategoryRecord> for Category {
    fn from(r: CategoryRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            icon: r.icon,
            kind: r.kind,
            color: r.color,
            hidden: r.hidden,
        }
    }
}

// transactions ----------------------------------------------------------------------------------

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub kind: Kind,
    pub category_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_value: Decimal,
    pub amount_currency_code: String,
    pub amount_currency_symbol: String,
    pub date: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub user_id: String,
}

impl Record for TransactionRecord {
    const TABLE: Table = Table::Transactions;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "kind",
        "category_id",
        "amount_value",
        "amount_currency_code",
        "amount_currency_symbol",
        "date",
        "note",
        "tags",
        "hidden",
        "user_id",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            kind: kind(row.try_get("kind")?)?,
            category_id: row.try_get("category_id")?,
            amount_value: decimal(row.try_get("amount_value")?)?,
            amount_currency_code: row.try_get("amount_currency_code")?,
            amount_currency_symbol: row.try_get("amount_currency_symbol")?,
            date: row.try_get("date")?,
            note: row.try_get("note")?,
            tags: tags_from_json(row.try_get("tags")?)?,
            hidden: row.try_get("hidden")?,
            user_id: row.try_get("user_id")?,
        })
    }

    fn bind<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id.as_str())
            .bind(self.kind.to_string())
            .bind(self.category_id.as_str())
            .bind(self.amount_value.to_string())
            .bind(self.amount_currency_code.as_str())
            .bind(self.amount_currency_symbol.as_str())
            .bind(self.date.as_str())
            .bind(self.note.as_deref())
            .bind(tags_to_json(&self.tags))
            .bind(self.hidden)
            .bind(self.user_id.as_str())
    }

    fn check(&self) -> Result<()> {
        Transaction::try_from(self.clone())?.validate()
    }
}

impl From<&Transaction> for TransactionRecord {
    fn from(t: &Transaction) -> Self {
        Self {
            id: t.id.clone(),
            kind: t.kind,
            category_id: t.category_id.clone(),
            amount_value: t.amount.value(),
            amount_currency_code: t.amount.currency().code().to_string(),
            amount_currency_symbol: t.amount.currency().symbol().to_string(),
            date: format_date(t.date),
            note: t.note.clone(),
            tags: t.tags.clone(),
            hidden: t.hidden,
            user_id: t.user_id.clone(),
        }
    }
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = Error;

    fn try_from(r: TransactionRecord) -> Result<Self> {
        let currency = Currency::new(&r.amount_currency_code, r.amount_currency_symbol)?;
        Ok(Self {
            date: parse_date(&r.date)?,
            id: r.id,
            kind: r.kind,
            category_id: r.category_id,
            amount: Money::new(r.amount_value, currency),
            note: r.note,
            tags: r.tags,
            hidden: r.hidden,
            user_id: r.user_id,
        })
    }
}

// users -----------------------------------------------------------------------------------------

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub settings_currency_code: String,
    pub settings_currency_symbol: String,
    #[serde(default)]
    pub settings_future_transaction_visibility_days: Option<u32>,
    #[serde(default)]
    pub settings_dark_mode: Option<bool>,
    #[serde(default)]
    pub total_transaction_count: u64,
    pub registration_date: String,
}

impl Record for UserRecord {
    const TABLE: Table = Table::Users;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "first_name",
        "last_name",
        "email",
        "settings_currency_code",
        "settings_currency_symbol",
        "settings_future_transaction_visibility_days",
        "settings_dark_mode",
        "total_transaction_count",
        "registration_date",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let days: Option<i64> = row.try_get("settings_future_transaction_visibility_days")?;
        let days = days
            .map(u32::try_from)
            .transpose()
            .context("The stored visibility window is out of range")?;
        let count: i64 = row.try_get("total_transaction_count")?;
        Ok(Self {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            settings_currency_code: row.try_get("settings_currency_code")?,
            settings_currency_symbol: row.try_get("settings_currency_symbol")?,
            settings_future_transaction_visibility_days: days,
            settings_dark_mode: row.try_get("settings_dark_mode")?,
            total_transaction_count: u64::try_from(count).unwrap_or_default(),
            registration_date: row.try_get("registration_date")?,
        })
    }

    fn bind<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id.as_str())
            .bind(self.first_name.as_str())
            .bind(self.last_name.as_str())
            .bind(self.email.as_str())
            .bind(self.settings_currency_code.as_str())
            .bind(self.settings_currency_symbol.as_str())
            .bind(self.settings_future_transaction_visibility_days.map(i64::from))
            .bind(self.settings_dark_mode)
            .bind(i64::try_from(self.total_transaction_count).unwrap_or(i64::MAX))
            .bind(self.registration_date.as_str())
    }

    fn check(&self) -> Result<()> {
        validate_id(&self.id)?;
        User::try_from(self.clone()).map(|_| ())
    }
}

impl From<&User> for UserRecord {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            email: u.email.clone(),
            settings_currency_code: u.settings.currency.code().to_string(),
            settings_currency_symbol: u.settings.currency.symbol().to_string(),
            settings_future_transaction_visibility_days: u
                .settings
                .future_transaction_visibility_days,
            settings_dark_mode: u.settings.dark_mode,
            total_transaction_count: u.total_transaction_count,
            registration_date: u.registration_date.clone(),
        }
    }
}

impl TryFrom<UserRecord> for User {
    type Error = Error;

    fn try_from(r: UserRecord) -> Result<Self> {
        Ok(Self {
            settings: Settings {
                currency: Currency::new(&r.settings_currency_code, r.settings_currency_symbol)?,
                future_transaction_visibility_days: r.settings_future_transaction_visibility_days,
                dark_mode: r.settings_dark_mode,
            },
            id: r.id,
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            total_transaction_count: r.total_transaction_count,
            registration_date: r.registration_date,
        })
    }
}

// change sets -----------------------------------------------------------------------------------

/// The changes to one table. Deletions carry only ids.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub struct TableChanges<R> {
    #[serde(default)]
    pub created: Vec<R>,
    #[serde(default)]
    pub updated: Vec<R>,
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl<R> Default for TableChanges<R> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<R> TableChanges<R> {
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Changes to every syncable table, as exchanged with `/api/sync/watermelon`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub categories: TableChanges<CategoryRecord>,
    #[serde(default)]
    pub transactions: TableChanges<TransactionRecord>,
    #[serde(default)]
    pub users: TableChanges<UserRecord>,
}

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.categories.len() + self.transactions.len() + self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The body of a successful pull. `timestamp` is the server clock in milliseconds and becomes the
/// next watermark.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    pub changes: ChangeSet,
    pub timestamp: i64,
}

/// Identifies exactly which version of a row was sent in a push.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SentRow {
    pub table: Table,
    pub id: String,
    pub revision: i64,
}

/// Everything that is dirty at the moment of collection.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PendingChanges {
    pub changes: ChangeSet,
    pub sent: Vec<SentRow>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

async fn pending_in<R: Record>(
    conn: &mut SqliteConnection,
    sent: &mut Vec<SentRow>,
) -> Result<TableChanges<R>> {
    let sql = format!(
        "SELECT {}, _status, _revision FROM {} WHERE _status != 'synced' ORDER BY _revision, id",
        R::COLUMNS.join(", "),
        R::TABLE.name()
    );
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    let mut changes = TableChanges::default();
    for row in rows {
        let status: String = row.try_get("_status")?;
        let revision: i64 = row.try_get("_revision")?;
        let record = R::from_row(&row)?;
        sent.push(SentRow {
            table: R::TABLE,
            id: record.id().to_string(),
            revision,
        });
        if status == RowStatus::Created.as_str() {
            changes.created.push(record);
        } else {
            changes.updated.push(record);
        }
    }
    Ok(changes)
}

async fn apply_upserts<R: Record>(
    conn: &mut SqliteConnection,
    changes: &TableChanges<R>,
    revision: i64,
) -> Result<usize> {
    let mut count = 0;
    for record in changes.created.iter().chain(changes.updated.iter()) {
        record.check()?;
        write_record(conn, record, WriteMode::Upsert, RowStatus::Synced, revision).await?;
        count += 1;
    }
    Ok(count)
}

async fn delete_rows(conn: &mut SqliteConnection, table: Table, ids: &[String]) -> Result<usize> {
    let sql = format!("DELETE FROM {} WHERE id = ?", table.name());
    let mut count = 0;
    for id in ids {
        let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
        count += result.rows_affected() as usize;
    }
    Ok(count)
}

impl Db {
    /// The server timestamp of the last successfully applied pull, `None` before the first sync.
    pub async fn last_pulled_at(&self) -> Result<Option<i64>> {
        let (value,): (Option<i64>,) =
            sqlx::query_as("SELECT last_pulled_at FROM sync_meta WHERE id = 1")
                .fetch_one(self.pool())
                .await?;
        Ok(value)
    }

    /// Collects every row that has changed locally since it was last acknowledged, together with
    /// the revision it had when collected.
    pub async fn pending_changes(&self) -> Result<PendingChanges> {
        let mut conn = self.pool().acquire().await?;
        let mut sent = Vec::new();
        let changes = ChangeSet {
            categories: pending_in(&mut conn, &mut sent).await?,
            transactions: pending_in(&mut conn, &mut sent).await?,
            users: pending_in(&mut conn, &mut sent).await?,
        };
        trace!("Collected {} dirty row(s)", sent.len());
        Ok(PendingChanges { changes, sent })
    }

    /// Applies a pulled change set and advances the watermark to `timestamp`, all in one write
    /// transaction. Pulled rows overwrite local ones. A deleted category that transactions still
    /// point at is hidden instead of removed. Returns the number of rows written or removed.
    pub async fn apply_pulled(&self, changes: &ChangeSet, timestamp: i64) -> Result<usize> {
        let mut tx = self.begin_write().await?;
        let revision = tx.revision();
        let mut count = 0;

        count += apply_upserts(tx.conn(), &changes.categories, revision).await?;
        count += apply_upserts(tx.conn(), &changes.transactions, revision).await?;
        count += apply_upserts(tx.conn(), &changes.users, revision).await?;

        count += delete_rows(tx.conn(), Table::Transactions, &changes.transactions.deleted).await?;
        for id in &changes.categories.deleted {
            let (references,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE category_id = ?")
                    .bind(id)
                    .fetch_one(&mut *tx.conn())
                    .await?;
            let result = if references > 0 {
                debug!("Category {id} was deleted remotely but is still referenced, hiding it");
                sqlx::query(
                    "UPDATE categories SET hidden = 1, _status = 'synced', _revision = ? \
                    WHERE id = ?",
                )
                .bind(revision)
                .bind(id)
                .execute(&mut *tx.conn())
                .await?
            } else {
                sqlx::query("DELETE FROM categories WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx.conn())
                    .await?
            };
            count += result.rows_affected() as usize;
        }
        count += delete_rows(tx.conn(), Table::Users, &changes.users.deleted).await?;

        sqlx::query("UPDATE sync_meta SET last_pulled_at = ? WHERE id = 1")
            .bind(timestamp)
            .execute(&mut *tx.conn())
            .await?;

        if !changes.categories.is_empty() {
            tx.touch(Table::Categories);
        }
        if !changes.transactions.is_empty() {
            tx.touch(Table::Transactions);
        }
        if !changes.users.is_empty() {
            tx.touch(Table::Users);
        }
        tx.commit().await?;
        debug!("Applied {count} pulled change(s), watermark now {timestamp}");
        Ok(count)
    }

    /// Marks the rows in `sent` as synced, but only where the row still has the revision that
    /// was pushed. Rows written after collection stay dirty.
    pub async fn acknowledge_push(&self, sent: &[SentRow]) -> Result<usize> {
        let mut tx = self.begin_write().await?;
        let mut count = 0;
        for row in sent {
            let sql = format!(
                "UPDATE {} SET _status = 'synced' WHERE id = ? AND _revision = ?",
                row.table.name()
            );
            let result = sqlx::query(&sql)
                .bind(row.id.as_str())
                .bind(row.revision)
                .execute(&mut *tx.conn())
                .await?;
            count += result.rows_affected() as usize;
        }
        tx.commit().await?;
        trace!("Acknowledged {count} of {} sent row(s)", sent.len());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{category, transaction, TestEnv};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_upsert_sql_keeps_created_rows_created() {
        let sql = write_sql::<CategoryRecord>(WriteMode::Upsert);
        assert!(sql.starts_with("INSERT INTO categories (id, name, icon, kind, color, hidden"));
        assert!(sql.contains("name = excluded.name"));
        assert!(!sql.contains("id = excluded.id"));
        assert!(sql.contains("categories._status = 'created'"));
        let sql = write_sql::<CategoryRecord>(WriteMode::InsertOrIgnore);
        assert!(sql.starts_with("INSERT OR IGNORE INTO categories"));
    }

    #[test]
    fn test_change_set_wire_format() {
        let json = r#"{
            "changes": {
                "categories": {
                    "created": [{"id": "673cb70801452339cd5b4ec1", "name": "Food",
                        "icon": "food", "kind": "expense", "color": "red", "hidden": false}],
                    "updated": [],
                    "deleted": []
                },
                "transactions": {
                    "created": [],
                    "updated": [{"id": "67071900f0844c2b758161c0", "kind": "expense",
                        "category_id": "673cb70801452339cd5b4ec1", "amount_value": 12.5,
                        "amount_currency_code": "EUR", "amount_currency_symbol": "€",
                        "date": "2024-10-10", "note": null, "tags": ["a"], "hidden": false,
                        "user_id": "6700000000000000000000aa"}],
                    "deleted": ["67071900f0844c2b758161c1"]
                }
            },
            "timestamp": 1728518400000
        }"#;
        let pull: PullResponse = serde_json::from_str(json).unwrap();
        assert_eq!(pull.timestamp, 1728518400000);
        assert_eq!(pull.changes.len(), 3);
        assert!(pull.changes.users.is_empty());
        let t = Transaction::try_from(pull.changes.transactions.updated[0].clone()).unwrap();
        assert_eq!(t.date, d(2024, 10, 10));
        assert_eq!(t.amount.value(), Decimal::new(125, 1));
    }

    #[tokio::test]
    async fn test_applying_a_pull_twice_does_not_duplicate() {
        let env = TestEnv::new().await;
        let db = env.db();
        let c = category("673cb70801452339cd5b4ec1", Kind::Expense);
        let t = transaction("67071900f0844c2b758161c0", &c.id, d(2024, 10, 10));
        let changes = ChangeSet {
            categories: TableChanges {
                created: vec![CategoryRecord::from(&c)],
                ..Default::default()
            },
            transactions: TableChanges {
                created: vec![TransactionRecord::from(&t)],
                ..Default::default()
            },
            ..Default::default()
        };

        db.apply_pulled(&changes, 100).await.unwrap();
        db.apply_pulled(&changes, 200).await.unwrap();

        assert_eq!(db.transaction_count().await.unwrap(), 1);
        assert_eq!(db.find_transaction(&t.id).await.unwrap(), t);
        assert_eq!(db.last_pulled_at().await.unwrap(), Some(200));
        // pulled rows are not dirty
        assert!(db.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pulled_delete_of_referenced_category_hides_it() {
        let env = TestEnv::new().await;
        let db = env.db();
        let used = category("673cb70801452339cd5b4ec1", Kind::Expense);
        let unused = category("673cb70801452339cd5b4ec2", Kind::Income);
        db.create_category(&used).await.unwrap();
        db.create_category(&unused).await.unwrap();
        db.create_transaction(&transaction("67071900f0844c2b758161c0", &used.id, d(2024, 1, 1)))
            .await
            .unwrap();

        let changes = ChangeSet {
            categories: TableChanges {
                deleted: vec![used.id.clone(), unused.id.clone()],
                ..Default::default()
            },
            ..Default::default()
        };
        db.apply_pulled(&changes, 1).await.unwrap();

        assert!(db.find_category(&used.id).await.unwrap().hidden);
        assert!(matches!(
            db.find_category(&unused.id).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_pull_leaves_watermark_alone() {
        let env = TestEnv::new().await;
        let db = env.db();
        let mut record = TransactionRecord::from(&transaction(
            "67071900f0844c2b758161c0",
            "673cb70801452339cd5b4ec1",
            d(2024, 10, 10),
        ));
        record.date = "2024-10-1".to_string();
        let changes = ChangeSet {
            transactions: TableChanges {
                created: vec![record],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(db.apply_pulled(&changes, 500).await.is_err());
        assert_eq!(db.last_pulled_at().await.unwrap(), None);
        assert_eq!(db.transaction_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_pulled_rows_are_rejected() {
        let env = TestEnv::new().await;
        let db = env.db();
        let c = category("673cb70801452339cd5b4ec1", Kind::Expense);
        db.create_category(&c).await.unwrap();
        let good = transaction("67071900f0844c2b758161c0", &c.id, d(2024, 10, 10));
        db.create_transaction(&good).await.unwrap();

        let base = TransactionRecord::from(&transaction(
            "67071900f0844c2b758161c1",
            &c.id,
            d(2024, 10, 11),
        ));
        let mut bad_currency = base.clone();
        bad_currency.amount_currency_code = "EURO".to_string();
        let mut negative = base.clone();
        negative.amount_value = Decimal::new(-500, 2);
        let mut long_note = base.clone();
        long_note.note = Some("x".repeat(80));
        let mut too_many_tags = base.clone();
        too_many_tags.tags = vec!["a".to_string(); 5];

        for record in [bad_currency, negative, long_note, too_many_tags] {
            let changes = ChangeSet {
                transactions: TableChanges {
                    updated: vec![record],
                    ..Default::default()
                },
                ..Default::default()
            };
            let err = db.apply_pulled(&changes, 500).await.unwrap_err();
            assert!(matches!(err, Error::Invalid { .. }), "{err:?}");
        }

        let mut user = UserRecord::from(&crate::test::user(crate::test::TEST_USER_ID));
        user.settings_currency_code = "E".to_string();
        let changes = ChangeSet {
            users: TableChanges {
                created: vec![user],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(db.apply_pulled(&changes, 500).await.is_err());

        // nothing was stored and the local rows still read back
        assert_eq!(db.last_pulled_at().await.unwrap(), None);
        assert_eq!(db.transaction_count().await.unwrap(), 1);
        assert_eq!(db.find_transaction(&good.id).await.unwrap(), good);
    }

    #[tokio::test]
    async fn test_rows_written_after_collection_stay_dirty() {
        let env = TestEnv::new().await;
        let db = env.db();
        let c = category("673cb70801452339cd5b4ec1", Kind::Expense);
        db.create_category(&c).await.unwrap();
        let t = transaction("67071900f0844c2b758161c0", &c.id, d(2024, 10, 10));
        db.create_transaction(&t).await.unwrap();

        let pending = db.pending_changes().await.unwrap();
        assert_eq!(pending.sent.len(), 2);
        assert_eq!(pending.changes.categories.created.len(), 1);
        assert_eq!(pending.changes.transactions.created.len(), 1);

        // a write lands while the push is in flight
        db.hide_transaction(&t.id, true).await.unwrap();

        assert_eq!(db.acknowledge_push(&pending.sent).await.unwrap(), 1);
        let still = db.pending_changes().await.unwrap();
        assert_eq!(still.sent.len(), 1);
        assert_eq!(still.sent[0].id, t.id);
        // it was never acknowledged, so it is still a creation
        assert_eq!(still.changes.transactions.created.len(), 1);
        assert!(still.changes.transactions.created[0].hidden);
    }
}
