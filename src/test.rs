//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::api::TestRemote;
use crate::db::Db;
use crate::model::{
    Category, Currency, Frequency, Kind, Money, Recurrence, RecurringTransaction, Settings,
    Transaction, User,
};
use crate::Config;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tempfile::TempDir;

pub const TEST_USER_ID: &str = "6700000000000000000000aa";

/// Test environment that sets up a home directory with Config and database.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// Creates a test environment with Config and initialized database.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("expense-sync");
        let config = Config::create(&root, "http://localhost:3000/")
            .await
            .unwrap();

        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    /// Returns a clone of the Config.
    pub fn config(&self) -> Config {
        self.config.clone()
    }

    /// Returns a handle to the database. Handles share the pool.
    pub fn db(&self) -> Db {
        self.config.db().clone()
    }

    /// A fresh test server, logged in as the seeded user.
    pub async fn remote(&self) -> TestRemote {
        use crate::api::{Credentials, Remote, TEST_EMAIL, TEST_PASSWORD};
        let remote = TestRemote::new();
        let token = remote
            .login(&Credentials {
                email: TEST_EMAIL.to_string(),
                password: TEST_PASSWORD.to_string(),
            })
            .await
            .unwrap();
        remote.set_access_token(Some(token.access_token));
        remote
    }
}

fn eur() -> Currency {
    Currency::new("EUR", "€").unwrap()
}

/// An expense category named "Food", or an income category named "Salary".
pub fn category(id: &str, kind: Kind) -> Category {
    match kind {
        Kind::Expense => Category::new(id, "Food", "food", kind, "#ff0000"),
        Kind::Income => Category::new(id, "Salary", "salary", kind, "#00ff00"),
    }
}

/// A 12.50 EUR expense tagged "work".
pub fn transaction(id: &str, category_id: &str, date: NaiveDate) -> Transaction {
    Transaction {
        id: id.to_string(),
        kind: Kind::Expense,
        category_id: category_id.to_string(),
        amount: Money::new(Decimal::new(1250, 2), eur()),
        date,
        note: Some("lunch".to_string()),
        tags: vec!["work".to_string()],
        hidden: false,
        user_id: TEST_USER_ID.to_string(),
    }
}

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        settings: Settings {
            currency: eur(),
            future_transaction_visibility_days: None,
            dark_mode: Some(false),
        },
        total_transaction_count: 0,
        registration_date: "2024-01-01T00:00:00.000Z".to_string(),
    }
}

/// A rule that repeats every single `frequency` step from `start`, charging 9.99 EUR. `next_date`
/// is left unset.
pub fn recurring(id: &str, frequency: Frequency, start: NaiveDate) -> RecurringTransaction {
    RecurringTransaction {
        id: id.to_string(),
        kind: Kind::Expense,
        category_id: "673cb70801452339cd5b4ec2".to_string(),
        amount: Money::new(Decimal::new(999, 2), eur()),
        note: Some("subscription".to_string()),
        tags: Vec::new(),
        user_id: TEST_USER_ID.to_string(),
        recurrence: Recurrence::new(frequency, 1, start),
    }
}
