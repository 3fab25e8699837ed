//! Imports transactions from a CSV file.

use crate::args::ImportArgs;
use crate::commands::{user_id, Out};
use crate::db::Db;
use crate::model::{Category, Currency, Kind, Money, Transaction};
use crate::{utils, Config, Error, Result};
use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

/// One line of the import file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CsvRow {
    date: String,
    kind: Kind,
    category: String,
    amount: Decimal,
    currency: String,
    symbol: String,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    tags: Option<String>,
}

/// Reads `args.file` and stores every row as a new transaction, all in one write transaction.
///
/// # Errors
/// - Returns an error naming the line if a row cannot be parsed, names an unknown category, or
///   has a kind different from its category's kind. Nothing is stored in that case.
pub async fn import(config: Config, args: ImportArgs) -> Result<Out<usize>> {
    let file = std::fs::File::open(&args.file)
        .with_context(|| format!("Unable to open {}", args.file.display()))?;
    let count = import_from(config.db(), file).await?;
    Ok(Out::new(
        format!("Imported {count} transaction(s) from {}", args.file.display()),
        count,
    ))
}

async fn import_from(db: &Db, reader: impl Read) -> Result<usize> {
    let rows = parse(reader)?;
    let user_id = user_id(db).await?;
    let mut categories: HashMap<String, Category> = HashMap::new();
    let mut transactions = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        // the header is line 1
        let line = i + 2;
        let key = row.category.to_lowercase();
        let category = match categories.get(&key) {
            Some(c) => c.clone(),
            None => {
                let c = db.find_category_by_name(&row.category).await?;
                categories.insert(key, c.clone());
                c
            }
        };
        if category.kind != row.kind {
            return Err(Error::invalid(
                "kind",
                format!(
                    "line {line}: '{}' is an {} category but the row is {}",
                    category.name, category.kind, row.kind
                ),
            ));
        }
        transactions.push(Transaction {
            id: utils::generate_id(),
            kind: row.kind,
            category_id: category.id,
            amount: Money::new(row.amount, Currency::new(&row.currency, row.symbol)?),
            date: utils::parse_date(row.date.trim())?,
            note: row.note.filter(|n| !n.is_empty()),
            tags: split_tags(row.tags.as_deref()),
            hidden: false,
            user_id: user_id.clone(),
        });
    }
    debug!("Parsed {} transaction(s) for import", transactions.len());
    db.create_transactions(&transactions).await
}

fn parse(reader: impl Read) -> Result<Vec<CsvRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for (i, result) in rdr.deserialize().enumerate() {
        let row: CsvRow = result.with_context(|| format!("Unable to parse line {}", i + 2))?;
        rows.push(row);
    }
    Ok(rows)
}

fn split_tags(tags: Option<&str>) -> Vec<String> {
    tags.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{category, TestEnv};

    const CSV: &str = "\
Date,Kind,Category,Amount,Currency,Symbol,Note,Tags
2024-10-10,expense,food,12.50,EUR,€,lunch,work;team
2024-10-11,income,Salary,3000,EUR,€,,
";

    async fn env() -> TestEnv {
        let env = TestEnv::new().await;
        env.db()
            .create_category(&category("673cb70801452339cd5b4ec1", Kind::Expense))
            .await
            .unwrap();
        env.db()
            .create_category(&category("673cb70801452339cd5b4ec2", Kind::Income))
            .await
            .unwrap();
        env
    }

    #[tokio::test]
    async fn test_import_rows() {
        let env = env().await;
        let count = import_from(&env.db(), CSV.as_bytes()).await.unwrap();
        assert_eq!(count, 2);
        let all = env
            .db()
            .transactions(&crate::db::TransactionQuery::default())
            .await
            .unwrap();
        assert_eq!(all[0].kind, Kind::Income);
        assert_eq!(all[0].note, None);
        assert!(all[0].tags.is_empty());
        assert_eq!(all[1].tags, vec!["work", "team"]);
        assert_eq!(all[1].amount.value(), Decimal::new(1250, 2));
    }

    #[tokio::test]
    async fn test_bad_row_imports_nothing() {
        let env = env().await;
        let csv = format!("{CSV}2024-10-12,income,Food,1,EUR,€,,\n");
        let err = import_from(&env.db(), csv.as_bytes()).await.unwrap_err();
        assert!(err.to_string().contains("line 4"));
        assert_eq!(env.db().transaction_count().await.unwrap(), 0);

        let csv = format!("{CSV}2024-10-12,expense,Travel,1,EUR,€,,\n");
        assert!(matches!(
            import_from(&env.db(), csv.as_bytes()).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags(Some(" a ; b;;")), vec!["a", "b"]);
        assert!(split_tags(None).is_empty());
    }
}
