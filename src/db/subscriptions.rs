//! Live queries. A subscription registry keyed by query signature is told which tables a write
//! transaction touched after it commits, and wakes the queries that read from those tables.

use crate::db::{Db, Table};
use crate::model::{Category, Transaction};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::trace;

/// A query that can be re-run whenever the tables it reads from change.
#[async_trait]
pub trait LiveSource: Send + Sync {
    type Output: Send;

    /// Identifies the query. Queries with equal signatures share one registry entry.
    fn signature(&self) -> String;

    /// The tables whose changes can alter the result.
    fn tables(&self) -> &'static [Table];

    async fn fetch(&self, db: &Db) -> Result<Self::Output>;
}

#[derive(Debug)]
struct Entry {
    tables: &'static [Table],
    sender: watch::Sender<u64>,
}

#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Subscriptions {
    fn subscribe(&self, signature: String, tables: &'static [Table]) -> watch::Receiver<u64> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(signature)
            .or_insert_with(|| Entry {
                tables,
                sender: watch::channel(0).0,
            })
            .sender
            .subscribe()
    }

    /// Wakes every live query that reads one of the `touched` tables, and forgets entries that
    /// nobody listens to anymore.
    pub(super) fn notify(&self, touched: &BTreeSet<Table>) {
        if touched.is_empty() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| entry.sender.receiver_count() > 0);
        for (signature, entry) in entries.iter() {
            if entry.tables.iter().any(|t| touched.contains(t)) {
                trace!("Waking live query {signature}");
                entry.sender.send_modify(|generation| *generation += 1);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// A subscribed query. The first call to `next` returns the current result immediately; later
/// calls wait until a committed write touches one of the query's tables and return the new
/// result.
pub struct LiveQuery<Q: LiveSource> {
    db: Db,
    query: Q,
    rx: watch::Receiver<u64>,
    primed: bool,
}

impl<Q: LiveSource> LiveQuery<Q> {
    pub async fn next(&mut self) -> Result<Q::Output> {
        if self.primed {
            self.rx
                .changed()
                .await
                .map_err(|_| anyhow::anyhow!("The store stopped publishing changes"))?;
        }
        // mark the current generation as seen before reading so that a write landing during the
        // fetch wakes the next call
        self.rx.borrow_and_update();
        self.primed = true;
        self.query.fetch(&self.db).await
    }

    pub fn query(&self) -> &Q {
        &self.query
    }
}

impl Db {
    /// Subscribes to `query`.
    pub fn live<Q: LiveSource>(&self, query: Q) -> LiveQuery<Q> {
        let rx = self.subscriptions.subscribe(query.signature(), query.tables());
        LiveQuery {
            db: self.clone(),
            query,
            rx,
            primed: false,
        }
    }
}

/// Transactions dated within `[start, end]` (either bound optional), newest first.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TransactionQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub include_hidden: bool,
}

impl TransactionQuery {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            include_hidden: false,
        }
    }
}

#[async_trait]
impl LiveSource for TransactionQuery {
    type Output = Vec<Transaction>;

    fn signature(&self) -> String {
        format!(
            "transactions:{:?}:{:?}:{}",
            self.start, self.end, self.include_hidden
        )
    }

    fn tables(&self) -> &'static [Table] {
        &[Table::Transactions]
    }

    async fn fetch(&self, db: &Db) -> Result<Vec<Transaction>> {
        db.transactions(self).await
    }
}

/// All categories ordered by name.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CategoryQuery {
    pub include_hidden: bool,
}

#[async_trait]
impl LiveSource for CategoryQuery {
    type Output = Vec<Category>;

    fn signature(&self) -> String {
        format!("categories:{}", self.include_hidden)
    }

    fn tables(&self) -> &'static [Table] {
        &[Table::Categories]
    }

    async fn fetch(&self, db: &Db) -> Result<Vec<Category>> {
        db.categories(self.include_hidden).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Kind, Settings};
    use crate::test::{category, transaction, user, TestEnv};
    use std::time::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_live_query_re_emits_after_commit() {
        let env = TestEnv::new().await;
        let db = env.db();
        let c = category("673cb70801452339cd5b4ec1", Kind::Expense);
        db.create_category(&c).await.unwrap();

        let mut live = db.live(TransactionQuery::between(d(2024, 10, 1), d(2024, 10, 31)));
        assert!(live.next().await.unwrap().is_empty());

        let t = transaction("67071900f0844c2b758161c0", &c.id, d(2024, 10, 10));
        db.create_transaction(&t).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(5), live.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, vec![t.clone()]);

        db.hide_transaction(&t.id, true).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(5), live.next())
            .await
            .unwrap()
            .unwrap();
        assert!(next.is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_writes_do_not_wake() {
        let env = TestEnv::new().await;
        let db = env.db();
        let mut live = db.live(CategoryQuery::default());
        assert!(live.next().await.unwrap().is_empty());

        db.save_user(&user("6700000000000000000000aa")).await.unwrap();
        db.update_settings(|s: &mut Settings| s.dark_mode = Some(true))
            .await
            .unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(100), live.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_equal_queries_share_an_entry_until_dropped() {
        let env = TestEnv::new().await;
        let db = env.db();
        let a = db.live(CategoryQuery::default());
        let b = db.live(CategoryQuery::default());
        let c = db.live(CategoryQuery {
            include_hidden: true,
        });
        assert_eq!(db.subscriptions.len(), 2);
        drop(a);
        drop(b);
        drop(c);
        db.create_category(&category("673cb70801452339cd5b4ec1", Kind::Income))
            .await
            .unwrap();
        assert_eq!(db.subscriptions.len(), 0);
    }
}
