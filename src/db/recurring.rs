use crate::db::changes::{tags_to_json, WriteMode};
use crate::db::transactions::insert_all;
use crate::db::{Db, Table};
use crate::model::{
    Currency, Frequency, Kind, Money, Recurrence, RecurringTransaction, Transaction,
};
use crate::recurrence::project;
use crate::utils::{format_date, parse_date};
use crate::{Error, Result};
use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;
use tracing::{debug, info};

const SELECT: &str = "SELECT id, kind, category_id, amount_value, amount_currency_code, \
    amount_currency_symbol, note, tags, user_id, frequency, interval_count, start_date, \
    end_date, next_date FROM recurring_transactions";

fn optional_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value.map(parse_date).transpose()
}

fn from_row(row: &SqliteRow) -> Result<RecurringTransaction> {
    let kind: &str = row.try_get("kind")?;
    let amount: &str = row.try_get("amount_value")?;
    let tags: &str = row.try_get("tags")?;
    let interval: i64 = row.try_get("interval_count")?;
    let currency = Currency::new(
        row.try_get::<&str, _>("amount_currency_code")?,
        row.try_get::<String, _>("amount_currency_symbol")?,
    )?;
    Ok(RecurringTransaction {
        id: row.try_get("id")?,
        kind: Kind::from_str(kind).with_context(|| format!("Unknown kind '{kind}'"))?,
        category_id: row.try_get("category_id")?,
        amount: Money::new(
            Decimal::from_str(amount)
                .with_context(|| format!("Unable to parse the amount '{amount}'"))?,
            currency,
        ),
        note: row.try_get("note")?,
        tags: serde_json::from_str(tags)
            .with_context(|| format!("Unable to parse the tags '{tags}'"))?,
        user_id: row.try_get("user_id")?,
        recurrence: Recurrence {
            frequency: Frequency::from_str(row.try_get("frequency")?)?,
            interval: u32::try_from(interval)
                .map_err(|_| Error::UnsupportedFrequency(format!("interval {interval}")))?,
            start_date: parse_date(row.try_get("start_date")?)?,
            end_date: optional_date(row.try_get("end_date")?)?,
            next_date: optional_date(row.try_get("next_date")?)?,
        },
    })
}

async fn all(conn: &mut SqliteConnection) -> Result<Vec<RecurringTransaction>> {
    let rows = sqlx::query(&format!("{SELECT} ORDER BY start_date, id"))
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(from_row).collect()
}

async fn set_next_date(
    conn: &mut SqliteConnection,
    id: &str,
    next_date: Option<NaiveDate>,
) -> Result<()> {
    sqlx::query("UPDATE recurring_transactions SET next_date = ? WHERE id = ?")
        .bind(next_date.map(format_date))
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl Db {
    /// Stores a new recurring rule. A rule that has never been materialized starts at its
    /// `start_date`.
    pub async fn create_recurring(
        &self,
        rule: &RecurringTransaction,
    ) -> Result<RecurringTransaction> {
        rule.validate()?;
        let mut rule = rule.clone();
        if rule.recurrence.next_date.is_none() {
            rule.recurrence.next_date = Some(rule.recurrence.start_date);
        }
        let r = &rule.recurrence;

        let mut tx = self.begin_write().await?;
        sqlx::query(
            "INSERT INTO recurring_transactions (id, kind, category_id, amount_value, \
            amount_currency_code, amount_currency_symbol, note, tags, user_id, frequency, \
            interval_count, start_date, end_date, next_date) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.id.as_str())
        .bind(rule.kind.to_string())
        .bind(rule.category_id.as_str())
        .bind(rule.amount.value().to_string())
        .bind(rule.amount.currency().code())
        .bind(rule.amount.currency().symbol())
        .bind(rule.note.as_deref())
        .bind(tags_to_json(&rule.tags))
        .bind(rule.user_id.as_str())
        .bind(r.frequency.to_string())
        .bind(i64::from(r.interval))
        .bind(format_date(r.start_date))
        .bind(r.end_date.map(format_date))
        .bind(r.next_date.map(format_date))
        .execute(&mut *tx.conn())
        .await?;
        tx.touch(Table::RecurringTransactions);
        tx.commit().await?;
        debug!("Created recurring transaction {}", rule.id);
        Ok(rule)
    }

    pub async fn find_recurring(&self, id: &str) -> Result<RecurringTransaction> {
        let row = sqlx::query(&format!("{SELECT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => from_row(&row),
            None => Err(Error::not_found("recurring transaction", id)),
        }
    }

    pub async fn recurring_transactions(&self) -> Result<Vec<RecurringTransaction>> {
        let mut conn = self.pool().acquire().await?;
        all(&mut conn).await
    }

    /// Projects every recurring rule through `now` and stores the resulting instances together
    /// with the advanced `next_date` of each rule, in one write transaction. Instances whose id
    /// already exists are skipped. Returns the instances that were newly stored.
    pub async fn materialize_recurring(&self, now: NaiveDate) -> Result<Vec<Transaction>> {
        let mut tx = self.begin_write().await?;
        let rules = all(tx.conn()).await?;
        let mut created = Vec::new();
        for rule in &rules {
            let projection = project(rule, now)?;
            if projection.updated.recurrence.next_date != rule.recurrence.next_date {
                set_next_date(tx.conn(), &rule.id, projection.updated.recurrence.next_date)
                    .await?;
                tx.touch(Table::RecurringTransactions);
            }
            for t in projection.transactions {
                if insert_all(&mut tx, std::slice::from_ref(&t), WriteMode::InsertOrIgnore).await?
                    > 0
                {
                    created.push(t);
                }
            }
        }
        tx.commit().await?;
        if !created.is_empty() {
            info!(
                "Materialized {} recurring transaction instance(s) through {now}",
                created.len()
            );
        }
        Ok(created)
    }
}
