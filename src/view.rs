//! Pure functions that derive what the user sees from rows read out of the store. Nothing here
//! fails: rows that cannot be displayed are filtered out.

use crate::model::{Category, Kind, Settings, Transaction};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Anything that sits on a calendar date.
pub trait Dated {
    fn date(&self) -> NaiveDate;
}

impl Dated for Transaction {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for NaiveDate {
    fn date(&self) -> NaiveDate {
        *self
    }
}

/// Filters `transactions` down to the ones that should be displayed. A transaction is dropped
/// when it is hidden, when its category is hidden or unknown, when its currency differs from the
/// settings currency, or when it lies beyond the future visibility window counted from `today`.
/// Order is preserved.
pub fn displayed_transactions(
    transactions: &[Transaction],
    categories: &[Category],
    settings: &Settings,
    today: NaiveDate,
) -> Vec<Transaction> {
    let visible: HashMap<&str, bool> = categories
        .iter()
        .map(|c| (c.id.as_str(), !c.hidden))
        .collect();
    let cutoff = settings
        .future_transaction_visibility_days
        .map(|days| today.checked_add_days(Days::new(u64::from(days))).unwrap_or(NaiveDate::MAX));
    let code = settings.currency.code();

    transactions
        .iter()
        .filter(|t| !t.hidden)
        .filter(|t| visible.get(t.category_id.as_str()).copied().unwrap_or(false))
        .filter(|t| t.amount.currency().code() == code)
        .filter(|t| cutoff.map_or(true, |cutoff| t.date <= cutoff))
        .cloned()
        .collect()
}

/// Returns the run of `items` dated within `[start, end]`, both ends inclusive.
///
/// `items` must be sorted by date, either ascending or descending; the direction is read off the
/// first and last element. The boundaries are found by binary search and the returned slice keeps
/// the input order.
pub fn within_dates<T: Dated>(items: &[T], start: NaiveDate, end: NaiveDate) -> &[T] {
    let (first, last) = match (items.first(), items.last()) {
        (Some(first), Some(last)) => (first.date(), last.date()),
        _ => return &[],
    };
    if start > end {
        return &[];
    }
    let (lo, hi) = if first <= last {
        (
            items.partition_point(|i| i.date() < start),
            items.partition_point(|i| i.date() <= end),
        )
    } else {
        (
            items.partition_point(|i| i.date() > end),
            items.partition_point(|i| i.date() >= start),
        )
    };
    if lo < hi {
        &items[lo..hi]
    } else {
        &[]
    }
}

/// The balance of `transactions`: income added, expenses subtracted. Assumes a single currency.
pub fn calc_total(transactions: &[Transaction]) -> Decimal {
    transactions.iter().map(Transaction::signed_value).sum()
}

/// Income, expense and net totals over a period. `income` and `expense` are magnitudes.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
}

impl PeriodTotals {
    pub fn of(transactions: &[Transaction]) -> Self {
        let mut totals = Self::default();
        for t in transactions {
            match t.kind {
                Kind::Income => totals.income += t.amount.value(),
                Kind::Expense => totals.expense += t.amount.value(),
            }
        }
        totals.net = totals.income - totals.expense;
        totals
    }
}

/// The transactions of one calendar date, e.g. a section in a list.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DateGroup {
    pub date: NaiveDate,
    pub total: Decimal,
    pub transactions: Vec<Transaction>,
}

/// Groups by exact date. Groups appear in the order their date first appears in the input, and
/// each group keeps the input order of its transactions.
pub fn group_by_date(transactions: &[Transaction]) -> Vec<DateGroup> {
    let mut groups: Vec<DateGroup> = Vec::new();
    let mut index: HashMap<NaiveDate, usize> = HashMap::new();
    for t in transactions {
        let i = *index.entry(t.date).or_insert_with(|| {
            groups.push(DateGroup {
                date: t.date,
                total: Decimal::ZERO,
                transactions: Vec::new(),
            });
            groups.len() - 1
        });
        groups[i].total += t.signed_value();
        groups[i].transactions.push(t.clone());
    }
    groups
}

/// The share of one category in a set of transactions, e.g. a slice of a chart.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CategoryBucket {
    pub category_id: String,
    pub count: usize,
    pub total: Decimal,
}

/// Groups by category id. Buckets are ordered by the magnitude of their total, largest first,
/// with ties broken by category id.
pub fn group_by_category(transactions: &[Transaction]) -> Vec<CategoryBucket> {
    let mut buckets: BTreeMap<&str, CategoryBucket> = BTreeMap::new();
    for t in transactions {
        let bucket = buckets
            .entry(t.category_id.as_str())
            .or_insert_with(|| CategoryBucket {
                category_id: t.category_id.clone(),
                count: 0,
                total: Decimal::ZERO,
            });
        bucket.count += 1;
        bucket.total += t.signed_value();
    }
    let mut buckets: Vec<CategoryBucket> = buckets.into_values().collect();
    // stable sort keeps the id order from the map for equal magnitudes
    buckets.sort_by(|a, b| b.total.abs().cmp(&a.total.abs()));
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Currency, Money};
    use crate::test::{category, transaction};

    const FOOD: &str = "673cb70801452339cd5b4ec1";
    const SALARY: &str = "673cb70801452339cd5b4ec2";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn settings(days: Option<u32>) -> Settings {
        Settings {
            currency: Currency::new("EUR", "€").unwrap(),
            future_transaction_visibility_days: days,
            dark_mode: None,
        }
    }

    fn ascending() -> Vec<NaiveDate> {
        vec![
            d(2024, 10, 1),
            d(2024, 10, 5),
            d(2024, 10, 10),
            d(2024, 10, 15),
            d(2024, 10, 20),
        ]
    }

    #[test]
    fn test_within_dates_ascending() {
        let data = ascending();
        let found = within_dates(&data, d(2024, 10, 5), d(2024, 10, 15));
        assert_eq!(found, &[d(2024, 10, 5), d(2024, 10, 10), d(2024, 10, 15)]);
    }

    #[test]
    fn test_within_dates_descending_keeps_order() {
        let mut data = ascending();
        data.reverse();
        let found = within_dates(&data, d(2024, 10, 5), d(2024, 10, 15));
        assert_eq!(found, &[d(2024, 10, 15), d(2024, 10, 10), d(2024, 10, 5)]);
    }

    #[test]
    fn test_within_dates_excludes_everything() {
        let data = ascending();
        assert!(within_dates(&data, d(2024, 9, 1), d(2024, 9, 30)).is_empty());
        assert!(within_dates(&data, d(2024, 11, 1), d(2024, 11, 30)).is_empty());
        assert!(within_dates(&data, d(2024, 10, 6), d(2024, 10, 9)).is_empty());
        assert!(within_dates(&data, d(2024, 10, 15), d(2024, 10, 5)).is_empty());
        let empty: Vec<NaiveDate> = Vec::new();
        assert!(within_dates(&empty, d(2024, 10, 1), d(2024, 10, 31)).is_empty());
    }

    #[test]
    fn test_within_dates_single_day() {
        let mut data = ascending();
        data.insert(2, d(2024, 10, 10));
        assert_eq!(within_dates(&data, d(2024, 10, 10), d(2024, 10, 10)).len(), 2);
        data.reverse();
        assert_eq!(within_dates(&data, d(2024, 10, 10), d(2024, 10, 10)).len(), 2);
    }

    #[test]
    fn test_displayed_filters() {
        let food = category(FOOD, Kind::Expense);
        let mut salary = category(SALARY, Kind::Income);
        salary.hidden = true;
        let categories = vec![food, salary];
        let today = d(2024, 10, 10);

        let plain = transaction("67071900f0844c2b758161c0", FOOD, today);
        let mut hidden = transaction("67071900f0844c2b758161c1", FOOD, today);
        hidden.hidden = true;
        let in_hidden_category = transaction("67071900f0844c2b758161c2", SALARY, today);
        let orphan = transaction("67071900f0844c2b758161c3", "673cb70801452339cd5b4ecf", today);
        let mut dollars = transaction("67071900f0844c2b758161c4", FOOD, d(2020, 1, 1));
        dollars.amount = Money::new(Decimal::ONE, Currency::new("USD", "$").unwrap());
        let all = vec![plain.clone(), hidden, in_hidden_category, orphan, dollars];

        let shown = displayed_transactions(&all, &categories, &settings(None), today);
        assert_eq!(shown, vec![plain]);
    }

    #[test]
    fn test_future_visibility_window() {
        let categories = vec![category(FOOD, Kind::Expense)];
        let today = d(2024, 10, 10);
        let rows = vec![
            transaction("67071900f0844c2b758161c0", FOOD, today),
            transaction("67071900f0844c2b758161c1", FOOD, d(2024, 10, 11)),
            transaction("67071900f0844c2b758161c2", FOOD, d(2025, 10, 11)),
        ];
        let count = |days| displayed_transactions(&rows, &categories, &settings(days), today).len();
        assert_eq!(count(None), 3);
        assert_eq!(count(Some(0)), 1);
        assert_eq!(count(Some(1)), 2);
        assert_eq!(count(Some(u32::MAX)), 3);
    }

    #[test]
    fn test_totals() {
        let mut income = transaction("67071900f0844c2b758161c0", SALARY, d(2024, 10, 1));
        income.kind = Kind::Income;
        income.amount = Money::new(Decimal::new(10000, 2), income.amount.currency().clone());
        let expense = transaction("67071900f0844c2b758161c1", FOOD, d(2024, 10, 2));
        let mut rows = vec![income, expense.clone()];

        let expected = Decimal::new(10000, 2) - expense.amount.value();
        assert_eq!(calc_total(&rows), expected);
        rows.reverse();
        assert_eq!(calc_total(&rows), expected);

        let totals = PeriodTotals::of(&rows);
        assert_eq!(totals.income, Decimal::new(10000, 2));
        assert_eq!(totals.expense, expense.amount.value());
        assert_eq!(totals.net, expected);
        assert_eq!(calc_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_group_by_date_keeps_order() {
        let rows = vec![
            transaction("67071900f0844c2b758161c0", FOOD, d(2024, 10, 12)),
            transaction("67071900f0844c2b758161c1", FOOD, d(2024, 10, 12)),
            transaction("67071900f0844c2b758161c2", FOOD, d(2024, 10, 3)),
        ];
        let groups = group_by_date(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].date, d(2024, 10, 12));
        assert_eq!(groups[0].transactions, rows[..2].to_vec());
        assert_eq!(groups[0].total, calc_total(&rows[..2]));
        assert_eq!(groups[1].date, d(2024, 10, 3));
    }

    #[test]
    fn test_group_by_category_largest_first() {
        let small = transaction("67071900f0844c2b758161c0", FOOD, d(2024, 10, 1));
        let mut big = transaction("67071900f0844c2b758161c1", SALARY, d(2024, 10, 1));
        big.amount = Money::new(
            small.amount.value() * Decimal::from(10),
            small.amount.currency().clone(),
        );
        let buckets = group_by_category(&[small.clone(), big, small]);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].category_id, SALARY);
        assert_eq!(buckets[0].count, 1);
        assert_eq!(buckets[1].category_id, FOOD);
        assert_eq!(buckets[1].count, 2);
    }
}
