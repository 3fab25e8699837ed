//! An offline-first expense tracker core: a local SQLite store of categories, transactions and
//! recurring rules, a projector that materializes recurring transactions, pure view functions,
//! and a sync engine that exchanges changes with a remote server.

pub mod api;
pub mod args;
pub mod commands;
mod config;
pub mod db;
mod error;
pub mod model;
pub mod recurrence;
pub mod sync;
mod utils;
pub mod view;

#[cfg(test)]
mod test;

pub use api::Mode;
pub use config::Config;
pub use db::Db;
pub use error::Error;
pub use error::Result;
pub use utils::{generate_id, parse_date, today};
