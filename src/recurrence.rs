//! Projects recurring transactions onto the calendar.
//!
//! Occurrence `k` of a rule is always computed from `start_date` (never by stepping from the
//! previous occurrence), so a monthly rule that starts on the 31st lands on the last day of short
//! months and returns to the 31st afterwards.

use crate::model::{Frequency, Recurrence, RecurringTransaction, Transaction};
use crate::utils::{format_date, id_seconds};
use crate::Result;
use chrono::{Datelike, Days, Months, NaiveDate, NaiveTime};
use sha2::{Digest, Sha256};
use tracing::trace;

/// The result of projecting one recurring transaction up to a reference date.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Projection {
    /// Materialized instances in ascending date order.
    pub transactions: Vec<Transaction>,
    /// The rule with `next_date` advanced past the reference date, or `None` once the schedule
    /// has reached `end_date`.
    pub updated: RecurringTransaction,
}

/// The final occurrence of a schedule.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LastOccurrence {
    /// There is no end date.
    Indefinite,
    /// The last occurrence strictly before the end date.
    On(NaiveDate),
    /// The end date is on or before the start date, so nothing ever occurs.
    Never,
}

/// Derives the identifier of the instance of `recurring_id` that occurs on `date`.
///
/// The id is ObjectId-shaped: the first 8 hex characters are the big-endian seconds of `date` at
/// midnight UTC (saturating outside 1970..2106), the remaining 16 are the start of
/// `sha256("{recurring_id}_{yyyy-MM-dd}")`.
/// Re-projecting the same window therefore yields the same ids on every device.
pub fn derive_instance_id(recurring_id: &str, date: NaiveDate) -> String {
    let seconds = id_seconds(date.and_time(NaiveTime::default()).and_utc().timestamp());
    let digest = Sha256::digest(format!("{recurring_id}_{}", format_date(date)).as_bytes());
    let digest = hex::encode(digest);
    format!("{}{}", hex::encode(seconds.to_be_bytes()), &digest[..16])
}

/// Returns occurrence number `k` (0 is `start_date`), or `None` when it is not representable.
pub fn occurrence(recurrence: &Recurrence, k: u32) -> Option<NaiveDate> {
    let steps = k.checked_mul(recurrence.interval)?;
    match recurrence.frequency {
        Frequency::Daily => recurrence
            .start_date
            .checked_add_days(Days::new(u64::from(steps))),
        Frequency::Weekly => recurrence
            .start_date
            .checked_add_days(Days::new(u64::from(steps) * 7)),
        Frequency::Monthly => recurrence
            .start_date
            .checked_add_months(Months::new(steps)),
    }
}

/// The smallest `k` whose occurrence is on or after `date`.
fn first_index_on_or_after(recurrence: &Recurrence, date: NaiveDate) -> u32 {
    let start = recurrence.start_date;
    if date <= start {
        return 0;
    }
    let interval = i64::from(recurrence.interval);
    let estimate = match recurrence.frequency {
        Frequency::Daily | Frequency::Weekly => {
            let step = if recurrence.frequency == Frequency::Weekly {
                interval * 7
            } else {
                interval
            };
            let diff = (date - start).num_days();
            (diff + step - 1) / step
        }
        Frequency::Monthly => months_between(start, date) / interval,
    };
    let mut k = u32::try_from(estimate.max(0)).unwrap_or(u32::MAX);
    while let Some(d) = occurrence(recurrence, k) {
        if d >= date {
            break;
        }
        k += 1;
    }
    k
}

fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    i64::from(to.year() - from.year()) * 12 + i64::from(to.month()) - i64::from(from.month())
}

fn before_end(recurrence: &Recurrence, date: NaiveDate) -> bool {
    recurrence.end_date.map_or(true, |end| date < end)
}

/// Materializes every occurrence of `rule` from its `next_date` up to and including `now`,
/// stopping before `end_date`.
///
/// Calling this again with the same `now` produces no transactions and leaves `next_date` as it
/// was. A rule whose `next_date` is `None` has finished and projects nothing.
pub fn project(rule: &RecurringTransaction, now: NaiveDate) -> Result<Projection> {
    rule.recurrence.validate()?;
    let recurrence = &rule.recurrence;
    let mut updated = rule.clone();

    let cursor = match recurrence.next_date {
        Some(next) => next,
        None => {
            return Ok(Projection {
                transactions: Vec::new(),
                updated,
            })
        }
    };

    let mut transactions = Vec::new();
    let mut k = first_index_on_or_after(recurrence, cursor);
    let next = loop {
        match occurrence(recurrence, k) {
            Some(date) if date <= now && before_end(recurrence, date) => {
                transactions.push(instance(rule, date));
                k += 1;
            }
            Some(date) if before_end(recurrence, date) => break Some(date),
            _ => break None,
        }
    };
    trace!(
        "Projected {} instance(s) of {} through {now}, next occurrence {next:?}",
        transactions.len(),
        rule.id
    );
    updated.recurrence.next_date = next;
    Ok(Projection {
        transactions,
        updated,
    })
}

/// The concrete transaction that `rule` produces on `date`.
pub fn instance(rule: &RecurringTransaction, date: NaiveDate) -> Transaction {
    Transaction {
        id: derive_instance_id(&rule.id, date),
        kind: rule.kind,
        category_id: rule.category_id.clone(),
        amount: rule.amount.clone(),
        date,
        note: rule.note.clone(),
        tags: rule.tags.clone(),
        hidden: false,
        user_id: rule.user_id.clone(),
    }
}

/// The last date on which `recurrence` occurs. `end_date` is exclusive: an occurrence that falls
/// exactly on it does not count.
pub fn last_occurrence(recurrence: &Recurrence) -> Result<LastOccurrence> {
    recurrence.validate()?;
    let end = match recurrence.end_date {
        None => return Ok(LastOccurrence::Indefinite),
        Some(end) => end,
    };
    if end <= recurrence.start_date {
        return Ok(LastOccurrence::Never);
    }
    // the first occurrence at or after `end` is one past the last one
    let k = first_index_on_or_after(recurrence, end);
    match k.checked_sub(1).and_then(|k| occurrence(recurrence, k)) {
        Some(date) => Ok(LastOccurrence::On(date)),
        None => Ok(LastOccurrence::Never),
    }
}
