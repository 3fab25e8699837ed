use crate::model::{Kind, Money};
use crate::utils::validate_id;
use crate::{Error, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Notes longer than this are rejected.
pub const MAX_NOTE_CHARS: usize = 30;

/// A transaction may carry at most this many tags.
pub const MAX_TAGS: usize = 4;

/// A single income or expense entry.
///
/// `amount` holds a non-negative magnitude; `kind` decides the sign. `date` has no time component
/// and serializes as a zero-padded `yyyy-MM-dd` string.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: Kind,
    pub category_id: String,
    pub amount: Money,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub user_id: String,
}

impl Transaction {
    /// The amount as it contributes to a balance: expenses are negated, income is kept as is.
    pub fn signed_value(&self) -> Decimal {
        match self.kind {
            Kind::Expense => -self.amount.value(),
            Kind::Income => self.amount.value(),
        }
    }

    /// The signed amount as a `Money`, suitable for `Money::format(true)`.
    pub fn signed_amount(&self) -> Money {
        Money::new(self.signed_value(), self.amount.currency().clone())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_id(&self.id)?;
        validate_id(&self.category_id)?;
        if self.amount.value().is_sign_negative() && !self.amount.is_zero() {
            return Err(Error::invalid(
                "amount",
                "the stored amount must be a non-negative magnitude",
            ));
        }
        if let Some(note) = &self.note {
            if note.chars().count() > MAX_NOTE_CHARS {
                return Err(Error::invalid(
                    "note",
                    format!("notes are limited to {MAX_NOTE_CHARS} characters"),
                ));
            }
        }
        validate_tags(&self.tags)
    }
}

/// Tags are an ordered set: no more than `MAX_TAGS` entries and no duplicates.
pub(crate) fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.len() > MAX_TAGS {
        return Err(Error::invalid(
            "tags",
            format!("at most {MAX_TAGS} tags are allowed, got {}", tags.len()),
        ));
    }
    let unique: BTreeSet<&str> = tags.iter().map(|t| t.as_str()).collect();
    if unique.len() != tags.len() {
        return Err(Error::invalid("tags", "tags must be unique"));
    }
    Ok(())
}
