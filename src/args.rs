//! These structs provide the CLI interface for the expense-sync CLI.

use crate::model::{DateRangeKind, Frequency, Kind};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// expense-sync: an offline-first expense tracker.
///
/// Your categories, transactions and recurring rules live in a local SQLite database, so every
/// command works without a network. `expense-sync sync` exchanges changes with the expense server
/// you configured with `expense-sync init`.
///
/// Set EXPENSE_SYNC_IN_TEST_MODE to any non-empty value to talk to a built-in test server instead
/// of a real one. Its data is kept in the home directory.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the configuration file and an empty database.
    ///
    /// This is the first command you should run. By default the data lives in
    /// $HOME/expense-sync; pass --home or set EXPENSE_SYNC_HOME to put it somewhere else.
    Init(InitArgs),
    /// Log in to the expense server and remember the session.
    Login(LoginArgs),
    /// End the session on the server and forget it locally.
    Logout,
    /// Pull changes from the server, then push local changes to it.
    Sync,
    /// Add, hide and list categories.
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Add and hide transactions.
    #[command(subcommand)]
    Transaction(TransactionCommand),
    /// Add recurring transactions and materialize their due occurrences.
    #[command(subcommand)]
    Recurring(RecurringCommand),
    /// List the transactions displayed in a date window.
    List(WindowArgs),
    /// Show income, expense and per-category totals for a date window.
    Summary(WindowArgs),
    /// Import transactions from a CSV file.
    ///
    /// The columns are Date,Kind,Category,Amount,Currency,Symbol,Note,Tags. Category is a
    /// category name. Tags are separated by ';'. All rows are imported or none are.
    Import(ImportArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where data and configuration is held. Defaults to ~/expense-sync
    #[arg(long, env = "EXPENSE_SYNC_HOME", default_value_t = default_home())]
    home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf) -> Self {
        Self {
            log_level,
            home: home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }
}

/// (Not shown): Args for the `expense-sync init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The base URL of the expense server, e.g. https://expenses.example.com/
    #[arg(long)]
    server_url: String,
}

impl InitArgs {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

/// (Not shown): Args for the `expense-sync login` command.
#[derive(Debug, Parser, Clone)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,

    /// The account password.
    #[arg(long, env = "EXPENSE_SYNC_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    /// Create a category.
    Add(AddCategoryArgs),
    /// Hide a category. Its transactions are no longer displayed.
    Hide(IdArgs),
    /// Make a hidden category visible again.
    Unhide(IdArgs),
    /// List categories ordered by name.
    List(ListCategoriesArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct AddCategoryArgs {
    #[arg(long)]
    pub name: String,

    /// expense or income. Cannot be changed later.
    #[arg(long)]
    pub kind: Kind,

    #[arg(long, default_value = "tag")]
    pub icon: String,

    #[arg(long, default_value = "#808080")]
    pub color: String,
}

#[derive(Debug, Parser, Clone)]
pub struct ListCategoriesArgs {
    /// Include hidden categories.
    #[arg(long)]
    pub all: bool,
}

/// A single entity id.
#[derive(Debug, Parser, Clone)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TransactionCommand {
    /// Create a transaction. Its kind is taken from its category.
    Add(AddTransactionArgs),
    /// Hide a transaction.
    Hide(IdArgs),
    /// Make a hidden transaction visible again.
    Unhide(IdArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct AddTransactionArgs {
    /// The category name (case-insensitive) or id.
    #[arg(long)]
    pub category: String,

    /// The amount as a positive decimal, e.g. 12.50
    #[arg(long)]
    pub amount: Decimal,

    /// yyyy-MM-dd, defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// At most 30 characters.
    #[arg(long)]
    pub note: Option<String>,

    /// Up to 4 distinct tags. Repeat the flag for each tag.
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RecurringCommand {
    /// Create a recurring transaction.
    Add(AddRecurringArgs),
    /// Create the transactions of every occurrence due on or before a date.
    Materialize(MaterializeArgs),
    /// List recurring transactions.
    List,
}

#[derive(Debug, Parser, Clone)]
pub struct AddRecurringArgs {
    /// The category name (case-insensitive) or id.
    #[arg(long)]
    pub category: String,

    #[arg(long)]
    pub amount: Decimal,

    /// daily, weekly or monthly
    #[arg(long)]
    pub frequency: Frequency,

    #[arg(long, default_value_t = 1)]
    pub interval: u32,

    /// The first occurrence, yyyy-MM-dd. Defaults to today.
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// No occurrence falls after this date.
    #[arg(long)]
    pub end: Option<NaiveDate>,

    #[arg(long)]
    pub note: Option<String>,

    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Debug, Parser, Clone)]
pub struct MaterializeArgs {
    /// Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

/// Selects the date window of `list` and `summary`. Without any flag the stored window is used.
#[derive(Debug, Parser, Clone, Default)]
pub struct WindowArgs {
    /// day, week, month or year
    #[arg(long)]
    pub range: Option<DateRangeKind>,

    /// A date inside the window, defaults to the stored window or today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Move the window this many ranges forward (negative for backward).
    #[arg(long, allow_hyphen_values = true)]
    pub shift: Option<i32>,
}

#[derive(Debug, Parser, Clone)]
pub struct ImportArgs {
    /// The CSV file to read.
    pub file: PathBuf,
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("expense-sync"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or EXPENSE_SYNC_HOME instead of relying on the default \
                home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("expense-sync")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}
