use crate::utils::validate_id;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Whether money leaves (`expense`) or enters (`income`) the user's pocket.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    #[default]
    Expense,
    Income,
}

serde_plain::derive_display_from_serialize!(Kind);
serde_plain::derive_fromstr_from_deserialize!(Kind);

/// A user-defined bucket that transactions are filed under.
///
/// `hidden` is a soft delete. The `kind` is fixed once the category exists; the store refuses
/// updates that change it.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub icon: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: Kind,
    pub color: String,
    #[serde(default)]
    pub hidden: bool,
}

impl Category {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        icon: impl Into<String>,
        kind: Kind,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: icon.into(),
            kind,
            color: color.into(),
            hidden: false,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_id(&self.id)
    }
}
