//! Command handlers for the expense-sync CLI.
//!
//! This module contains implementations for all CLI subcommands.

mod auth;
mod category;
mod import;
mod init;
mod recurring;
mod sync;
mod transaction;
mod window;

use crate::db::Db;
use crate::model::{Category, Currency, Settings};
use crate::utils::validate_id;
use crate::Result;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub use auth::{login, logout};
pub use category::{add_category, hide_category, list_categories};
pub use import::import;
pub use init::init;
pub use recurring::{add_recurring, list_recurring, materialize};
pub use sync::sync;
pub use transaction::{add_transaction, hide_transaction};
pub use window::{list, summary, Listing, Summary};

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Finds a category by id, or else by case-insensitive name.
async fn resolve_category(db: &Db, id_or_name: &str) -> Result<Category> {
    if validate_id(id_or_name).is_ok() {
        if let Ok(category) = db.find_category(id_or_name).await {
            return Ok(category);
        }
    }
    db.find_category_by_name(id_or_name).await
}

/// The logged-in user's settings, or euro with no cutoff when nobody is logged in.
async fn settings(db: &Db) -> Result<Settings> {
    Ok(match db.current_user().await? {
        Some(user) => user.settings,
        None => Settings {
            currency: Currency::default(),
            future_transaction_visibility_days: None,
            dark_mode: None,
        },
    })
}

/// The id stamped on new rows, empty when nobody is logged in.
async fn user_id(db: &Db) -> Result<String> {
    Ok(db.current_user().await?.map(|u| u.id).unwrap_or_default())
}
