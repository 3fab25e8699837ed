//! Types that represent the core data model, such as `Transaction` and `Category`.
mod category;
mod money;
mod recurring;
mod state;
pub(crate) mod transaction;
mod user;

pub use category::{Category, Kind};
pub use money::{Currency, Money};
pub use recurring::{Frequency, Recurrence, RecurringTransaction};
pub use state::{AppState, DateRangeKind, DisplayWindow, StateAction, APP_STATE_ID};
pub use transaction::{Transaction, MAX_NOTE_CHARS, MAX_TAGS};
pub use user::{NewAccount, Settings, User};
