use crate::model::{Kind, Money};
use crate::utils::validate_id;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// How far apart two occurrences of a recurring transaction are, before applying the interval.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Display for Frequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            bad => Err(Error::UnsupportedFrequency(format!(
                "'{bad}' is not one of daily, weekly, monthly"
            ))),
        }
    }
}

/// The schedule part of a recurring transaction.
///
/// `end_date` is exclusive. `next_date` is the first occurrence that has not been materialized
/// yet, or `None` once the schedule has run past `end_date`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    pub frequency: Frequency,
    pub interval: u32,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub next_date: Option<NaiveDate>,
}

impl Recurrence {
    pub fn new(frequency: Frequency, interval: u32, start_date: NaiveDate) -> Self {
        Self {
            frequency,
            interval,
            start_date,
            end_date: None,
            next_date: None,
        }
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(Error::UnsupportedFrequency(
                "the interval must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

/// A rule that produces a concrete `Transaction` on every occurrence date.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTransaction {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: Kind,
    pub category_id: String,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub user_id: String,
    pub recurrence: Recurrence,
}

impl RecurringTransaction {
    pub(crate) fn validate(&self) -> Result<()> {
        validate_id(&self.id)?;
        validate_id(&self.category_id)?;
        crate::model::transaction::validate_tags(&self.tags)?;
        self.recurrence.validate()
    }
}
