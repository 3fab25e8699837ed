//! The client side of the expense server's REST API.
//!
//! `Remote` is the contract the sync engine and the commands call. `HttpRemote` talks to a real
//! server; `TestRemote` keeps an in-memory server so that everything above this module can run
//! without a network.

mod http;
mod test_remote;

pub use http::HttpRemote;
pub use test_remote::{
    Failure, Stamped, TestRemote, TestServerState, Tombstone, TEST_EMAIL, TEST_PASSWORD,
};

use crate::db::{ChangeSet, PullResponse};
use crate::model::{Category, NewAccount, Transaction, User};
use crate::{Config, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// The environment variable that switches the program to the in-memory test server.
pub const TEST_MODE_ENV: &str = "EXPENSE_SYNC_IN_TEST_MODE";

/// Selects which `Remote` implementation the program uses.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum Mode {
    /// Talk to the server at the configured URL.
    #[default]
    Http,
    /// Use the in-memory test server.
    Test,
}

impl Mode {
    /// `Mode::Test` when `EXPENSE_SYNC_IN_TEST_MODE` is set and non-empty, otherwise `Mode::Http`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Test,
            _ => Mode::Http,
        }
    }
}

/// The body of `login`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// The response to a successful `login`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
}

/// The body of `changeUserPassword`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// The body of the `.../hidden` endpoints.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) struct Hidden {
    pub(crate) hidden: bool,
}

/// The operations the expense server offers. Every call except `login` and `create_user` carries
/// the bearer token set with `set_access_token`. A 403 answer surfaces as
/// `Error::SessionExpired`.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Sets or clears the bearer token sent with later requests.
    fn set_access_token(&self, token: Option<String>);

    async fn get_user(&self) -> Result<User>;

    async fn login(&self, credentials: &Credentials) -> Result<AccessToken>;

    async fn create_user(&self, account: &NewAccount) -> Result<()>;

    async fn change_user_password(&self, user_id: &str, change: &PasswordChange) -> Result<()>;

    async fn logout(&self) -> Result<()>;

    async fn create_category(&self, category: &Category) -> Result<Category>;

    async fn hide_category(&self, id: &str, hidden: bool) -> Result<()>;

    async fn update_category(&self, category: &Category) -> Result<()>;

    /// Transactions dated within `[from, to]`; either bound may be left open.
    async fn get_transactions(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>>;

    async fn create_transaction(&self, transaction: &Transaction) -> Result<Transaction>;

    async fn hide_transaction(&self, id: &str, hidden: bool) -> Result<()>;

    async fn update_transaction(&self, transaction: &Transaction) -> Result<()>;

    /// Everything that changed on the server after `last_pulled_at` (everything when `None`).
    async fn pull_changes(&self, last_pulled_at: Option<i64>) -> Result<PullResponse>;

    /// Sends local changes. `last_pulled_at` is the watermark they were made against.
    async fn push_changes(&self, changes: &ChangeSet, last_pulled_at: Option<i64>) -> Result<()>;
}

/// Builds the `Remote` for `mode`, authenticated with `access_token` when one is given.
pub fn remote(config: &Config, mode: Mode, access_token: Option<String>) -> Result<Arc<dyn Remote>> {
    let remote: Arc<dyn Remote> = match mode {
        Mode::Http => Arc::new(HttpRemote::from_config(config)?),
        Mode::Test => {
            debug!("Using the in-memory test server");
            Arc::new(TestRemote::persistent(config.test_server_path())?)
        }
    };
    remote.set_access_token(access_token);
    Ok(remote)
}
