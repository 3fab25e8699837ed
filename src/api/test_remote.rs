//! Implements `Remote` with an in-memory server for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without a server. In that mode the server state is kept in a JSON file in
//! the home directory so that it survives between invocations.

use crate::api::{AccessToken, Credentials, PasswordChange, Remote};
use crate::db::{
    CategoryRecord, ChangeSet, PullResponse, TableChanges, TransactionRecord, UserRecord,
};
use crate::model::{Category, Currency, NewAccount, Settings, Transaction, User};
use crate::{utils, Error, Result};
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// The account the test server is seeded with.
pub const TEST_EMAIL: &str = "ada@example.com";
pub const TEST_PASSWORD: &str = "password";
const TEST_USER_ID: &str = "6700000000000000000000aa";

/// A failure the test server will produce instead of handling the next call.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Failure {
    /// The request never reaches the server.
    Network,
    /// The server answers with this status and a JSON error body.
    Server(u16),
    /// The server rejects the token with a 403.
    SessionExpired,
}

impl Failure {
    fn into_error(self) -> Error {
        match self {
            Failure::Network => Error::network_unavailable(),
            Failure::Server(status) => Error::Server {
                status,
                message: "Injected failure".to_string(),
            },
            Failure::SessionExpired => Error::SessionExpired,
        }
    }
}

/// A row together with the server clock readings of its creation and last update.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Stamped<R> {
    pub record: R,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    pub table: String,
    pub id: String,
    pub deleted_at: i64,
}

/// Everything the test server knows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestServerState {
    /// Milliseconds on the server clock. Advances by one on every mutation.
    pub clock: i64,
    pub password: String,
    pub tokens: Vec<String>,
    pub users: BTreeMap<String, Stamped<UserRecord>>,
    pub categories: BTreeMap<String, Stamped<CategoryRecord>>,
    pub transactions: BTreeMap<String, Stamped<TransactionRecord>>,
    pub deleted: Vec<Tombstone>,
    #[serde(skip)]
    pub failures: VecDeque<Failure>,
    #[serde(skip)]
    pub calls: Vec<&'static str>,
}

impl Default for TestServerState {
    /// A server with one user and no data.
    fn default() -> Self {
        let mut state = Self {
            clock: 1_000,
            password: TEST_PASSWORD.to_string(),
            tokens: Vec::new(),
            users: BTreeMap::new(),
            categories: BTreeMap::new(),
            transactions: BTreeMap::new(),
            deleted: Vec::new(),
            failures: VecDeque::new(),
            calls: Vec::new(),
        };
        let user = User {
            id: TEST_USER_ID.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: TEST_EMAIL.to_string(),
            settings: Settings {
                currency: Currency::default(),
                future_transaction_visibility_days: None,
                dark_mode: None,
            },
            total_transaction_count: 0,
            registration_date: "2024-01-01T00:00:00.000Z".to_string(),
        };
        let at = state.tick();
        state.users.insert(
            user.id.clone(),
            Stamped {
                record: UserRecord::from(&user),
                created_at: at,
                updated_at: at,
            },
        );
        state
    }
}

fn upsert<R: Clone>(map: &mut BTreeMap<String, Stamped<R>>, id: &str, record: R, at: i64) {
    match map.get_mut(id) {
        Some(existing) => {
            existing.record = record;
            existing.updated_at = at;
        }
        None => {
            map.insert(
                id.to_string(),
                Stamped {
                    record,
                    created_at: at,
                    updated_at: at,
                },
            );
        }
    }
}

fn changes_since<R: Clone>(
    map: &BTreeMap<String, Stamped<R>>,
    deleted: &[Tombstone],
    table: &str,
    since: Option<i64>,
) -> TableChanges<R> {
    let since = since.unwrap_or(i64::MIN);
    let mut changes = TableChanges::default();
    for row in map.values() {
        if row.created_at > since {
            changes.created.push(row.record.clone());
        } else if row.updated_at > since {
            changes.updated.push(row.record.clone());
        }
    }
    changes.deleted = deleted
        .iter()
        .filter(|t| t.table == table && t.deleted_at > since)
        .map(|t| t.id.clone())
        .collect();
    changes
}

impl TestServerState {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn user(&self) -> Result<User> {
        let row = self
            .users
            .values()
            .next()
            .ok_or_else(|| Error::not_found("user", "current"))?;
        User::try_from(row.record.clone())
    }

    /// Stores a transaction as if another device had created it.
    pub fn insert_transaction(&mut self, transaction: &Transaction) {
        let at = self.tick();
        upsert(
            &mut self.transactions,
            &transaction.id,
            TransactionRecord::from(transaction),
            at,
        );
    }

    /// Stores a category as if another device had created it.
    pub fn insert_category(&mut self, category: &Category) {
        let at = self.tick();
        upsert(
            &mut self.categories,
            &category.id,
            CategoryRecord::from(category),
            at,
        );
    }

    /// Deletes a transaction as if another device had deleted it.
    pub fn delete_transaction(&mut self, id: &str) {
        let at = self.tick();
        if self.transactions.remove(id).is_some() {
            self.deleted.push(Tombstone {
                table: "transactions".to_string(),
                id: id.to_string(),
                deleted_at: at,
            });
        }
    }
}

/// An implementation of `Remote` that keeps its data in memory. Clones share the same server, so
/// a test can hold one clone to inspect and steer the server while the code under test uses
/// another.
#[derive(Debug, Clone, Default)]
pub struct TestRemote {
    state: Arc<Mutex<TestServerState>>,
    token: Arc<Mutex<Option<String>>>,
    path: Option<PathBuf>,
}

impl TestRemote {
    /// A fresh server seeded with the test user.
    pub fn new() -> Self {
        Self::default()
    }

    /// A server whose state is loaded from, and saved back to, the JSON file at `path`.
    pub fn persistent(path: PathBuf) -> Result<Self> {
        let state = if path.is_file() {
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("Unable to read {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("Unable to parse {}", path.display()))?
        } else {
            TestServerState::default()
        };
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            token: Arc::new(Mutex::new(None)),
            path: Some(path),
        })
    }

    /// Makes the next call fail with `failure`. Failures queue up in order.
    pub fn fail_next(&self, failure: Failure) {
        self.lock().failures.push_back(failure);
    }

    /// Gives access to the server state, e.g. to simulate changes made by another device.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut TestServerState) -> T) -> T {
        f(&mut self.lock())
    }

    /// The names of the operations called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    /// Revokes every issued token, so that the next authenticated call gets a 403.
    pub fn expire_sessions(&self) {
        self.lock().tokens.clear();
    }

    fn lock(&self) -> MutexGuard<'_, TestServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records the call, then produces an injected failure or checks the token.
    fn begin(&self, op: &'static str, authenticated: bool) -> Result<MutexGuard<'_, TestServerState>> {
        trace!("Test server handling {op}");
        let token = self.token.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut state = self.lock();
        state.calls.push(op);
        if let Some(failure) = state.failures.pop_front() {
            return Err(failure.into_error());
        }
        if authenticated && !token.map_or(false, |t| state.tokens.contains(&t)) {
            return Err(Error::SessionExpired);
        }
        Ok(state)
    }

    async fn save(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        let json = serde_json::to_string_pretty(&*self.lock())
            .context("Unable to serialize the test server state")?;
        utils::write(path, json).await
    }
}

#[async_trait::async_trait]
impl Remote for TestRemote {
    fn set_access_token(&self, token: Option<String>) {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = token;
    }

    async fn get_user(&self) -> Result<User> {
        self.begin("get_user", true)?.user()
    }

    async fn login(&self, credentials: &Credentials) -> Result<AccessToken> {
        let token = {
            let mut state = self.begin("login", false)?;
            let user = state.user()?;
            if user.email != credentials.email || state.password != credentials.password {
                return Err(Error::Server {
                    status: 401,
                    message: "Invalid email or password".to_string(),
                });
            }
            let token = format!("test-token-{}", utils::generate_id());
            state.tokens.push(token.clone());
            token
        };
        self.save().await?;
        Ok(AccessToken {
            access_token: token,
        })
    }

    async fn create_user(&self, account: &NewAccount) -> Result<()> {
        let state = self.begin("create_user", false)?;
        if state.users.values().any(|u| u.record.email == account.email) {
            return Err(Error::Server {
                status: 409,
                message: "Email already in use".to_string(),
            });
        }
        // the test server holds a single account
        Err(Error::Server {
            status: 501,
            message: "The test server does not create accounts".to_string(),
        })
    }

    async fn change_user_password(&self, user_id: &str, change: &PasswordChange) -> Result<()> {
        {
            let mut state = self.begin("change_user_password", true)?;
            if !state.users.contains_key(user_id) {
                return Err(Error::Server {
                    status: 404,
                    message: "User not found".to_string(),
                });
            }
            if state.password != change.current_password {
                return Err(Error::Server {
                    status: 400,
                    message: "The current password is wrong".to_string(),
                });
            }
            state.password = change.new_password.clone();
        }
        self.save().await
    }

    async fn logout(&self) -> Result<()> {
        let token = self.token.lock().unwrap_or_else(|e| e.into_inner()).clone();
        {
            let mut state = self.begin("logout", true)?;
            state.tokens.retain(|t| Some(t) != token.as_ref());
        }
        self.save().await
    }

    async fn create_category(&self, category: &Category) -> Result<Category> {
        {
            let mut state = self.begin("create_category", true)?;
            state.insert_category(category);
        }
        self.save().await?;
        Ok(category.clone())
    }

    async fn hide_category(&self, id: &str, hidden: bool) -> Result<()> {
        {
            let mut state = self.begin("hide_category", true)?;
            let at = state.tick();
            let row = state
                .categories
                .get_mut(id)
                .ok_or_else(|| Error::not_found("category", id))?;
            row.record.hidden = hidden;
            row.updated_at = at;
        }
        self.save().await
    }

    async fn update_category(&self, category: &Category) -> Result<()> {
        {
            let mut state = self.begin("update_category", true)?;
            if !state.categories.contains_key(&category.id) {
                return Err(Error::not_found("category", &category.id));
            }
            state.insert_category(category);
        }
        self.save().await
    }

    async fn get_transactions(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>> {
        let state = self.begin("get_transactions", true)?;
        let mut found = Vec::new();
        for row in state.transactions.values() {
            let t = Transaction::try_from(row.record.clone())?;
            if from.map_or(true, |f| t.date >= f) && to.map_or(true, |to| t.date <= to) {
                found.push(t);
            }
        }
        found.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn create_transaction(&self, transaction: &Transaction) -> Result<Transaction> {
        {
            let mut state = self.begin("create_transaction", true)?;
            state.insert_transaction(transaction);
        }
        self.save().await?;
        Ok(transaction.clone())
    }

    async fn hide_transaction(&self, id: &str, hidden: bool) -> Result<()> {
        {
            let mut state = self.begin("hide_transaction", true)?;
            let at = state.tick();
            let row = state
                .transactions
                .get_mut(id)
                .ok_or_else(|| Error::not_found("transaction", id))?;
            row.record.hidden = hidden;
            row.updated_at = at;
        }
        self.save().await
    }

    async fn update_transaction(&self, transaction: &Transaction) -> Result<()> {
        {
            let mut state = self.begin("update_transaction", true)?;
            if !state.transactions.contains_key(&transaction.id) {
                return Err(Error::not_found("transaction", &transaction.id));
            }
            state.insert_transaction(transaction);
        }
        self.save().await
    }

    async fn pull_changes(&self, last_pulled_at: Option<i64>) -> Result<PullResponse> {
        let state = self.begin("pull_changes", true)?;
        Ok(PullResponse {
            changes: ChangeSet {
                categories: changes_since(
                    &state.categories,
                    &state.deleted,
                    "categories",
                    last_pulled_at,
                ),
                transactions: changes_since(
                    &state.transactions,
                    &state.deleted,
                    "transactions",
                    last_pulled_at,
                ),
                users: changes_since(&state.users, &state.deleted, "users", last_pulled_at),
            },
            timestamp: state.clock,
        })
    }

    async fn push_changes(&self, changes: &ChangeSet, _last_pulled_at: Option<i64>) -> Result<()> {
        {
            let mut state = self.begin("push_changes", true)?;
            // last writer wins
            let at = state.tick();
            for r in changes.categories.created.iter().chain(&changes.categories.updated) {
                upsert(&mut state.categories, &r.id, r.clone(), at);
            }
            for r in changes
                .transactions
                .created
                .iter()
                .chain(&changes.transactions.updated)
            {
                upsert(&mut state.transactions, &r.id, r.clone(), at);
            }
            for r in changes.users.created.iter().chain(&changes.users.updated) {
                upsert(&mut state.users, &r.id, r.clone(), at);
            }
        }
        self.save().await
    }
}
