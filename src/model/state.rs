//! The app-state singleton and the pure reducer that evolves it.

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// The fixed primary key of the app-state row.
pub const APP_STATE_ID: &str = "expense-tracker";

/// The granularity of the date window the user is looking at.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRangeKind {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

serde_plain::derive_display_from_serialize!(DateRangeKind);
serde_plain::derive_fromstr_from_deserialize!(DateRangeKind);

/// An inclusive `[start, end]` window of calendar dates plus its display label.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayWindow {
    pub kind: DateRangeKind,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub text: String,
}

impl DisplayWindow {
    /// The window of `kind` that contains `reference`. Weeks start on Monday.
    pub fn containing(kind: DateRangeKind, reference: NaiveDate) -> Self {
        let (start, end) = match kind {
            DateRangeKind::Day => (reference, reference),
            DateRangeKind::Week => {
                let start = reference
                    - Duration::days(i64::from(reference.weekday().num_days_from_monday()));
                (start, start + Duration::days(6))
            }
            DateRangeKind::Month => {
                let start = reference.with_day(1).unwrap_or(reference);
                let end = start
                    .checked_add_months(Months::new(1))
                    .and_then(|d| d.pred_opt())
                    .unwrap_or(reference);
                (start, end)
            }
            DateRangeKind::Year => {
                let start = reference.with_ordinal(1).unwrap_or(reference);
                let end = NaiveDate::from_ymd_opt(reference.year(), 12, 31).unwrap_or(reference);
                (start, end)
            }
        };
        let text = match kind {
            DateRangeKind::Day => start.format("%b %-d, %Y").to_string(),
            DateRangeKind::Week => format!(
                "{} - {}",
                start.format("%b %-d"),
                end.format("%b %-d, %Y")
            ),
            DateRangeKind::Month => start.format("%B %Y").to_string(),
            DateRangeKind::Year => start.format("%Y").to_string(),
        };
        Self {
            kind,
            start,
            end,
            text,
        }
    }

    /// Moves the window `steps` units forward (or backward when negative).
    pub fn shift(&self, steps: i32) -> Self {
        let reference = match self.kind {
            DateRangeKind::Day => self.start + Duration::days(i64::from(steps)),
            DateRangeKind::Week => self.start + Duration::weeks(i64::from(steps)),
            DateRangeKind::Month => add_months(self.start, steps),
            DateRangeKind::Year => add_months(self.start, steps.saturating_mul(12)),
        };
        Self::containing(self.kind, reference)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let m = Months::new(months.unsigned_abs());
    let shifted = if months >= 0 {
        date.checked_add_months(m)
    } else {
        date.checked_sub_months(m)
    };
    shifted.unwrap_or(date)
}

/// The singleton describing the session and the display window. Never deleted; replaced
/// wholesale by `reduce`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub is_authenticated: bool,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub display_date_range: DateRangeKind,
    pub display_date_start: NaiveDate,
    pub display_date_end: NaiveDate,
    pub display_date_text: String,
}

/// Everything that can happen to the app state.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StateAction {
    LoggedIn {
        access_token: String,
        user_id: Option<String>,
    },
    LoggedOut,
    DisplayRangeChanged(DisplayWindow),
}

impl AppState {
    /// The state created at first launch: logged out, looking at the current month.
    pub fn initial(today: NaiveDate) -> Self {
        let window = DisplayWindow::containing(DateRangeKind::Month, today);
        Self {
            is_authenticated: false,
            access_token: None,
            user_id: None,
            display_date_range: window.kind,
            display_date_start: window.start,
            display_date_end: window.end,
            display_date_text: window.text,
        }
    }

    pub fn display_window(&self) -> DisplayWindow {
        DisplayWindow {
            kind: self.display_date_range,
            start: self.display_date_start,
            end: self.display_date_end,
            text: self.display_date_text.clone(),
        }
    }

    /// Returns the state that results from applying `action`. `self` is left untouched.
    pub fn reduce(&self, action: StateAction) -> AppState {
        let mut next = self.clone();
        match action {
            StateAction::LoggedIn {
                access_token,
                user_id,
            } => {
                next.is_authenticated = true;
                next.access_token = Some(access_token);
                next.user_id = user_id;
            }
            StateAction::LoggedOut => {
                next.is_authenticated = false;
                next.access_token = None;
                next.user_id = None;
            }
            StateAction::DisplayRangeChanged(window) => {
                next.display_date_range = window.kind;
                next.display_date_start = window.start;
                next.display_date_end = window.end;
                next.display_date_text = window.text;
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_window() {
        let w = DisplayWindow::containing(DateRangeKind::Month, d(2024, 2, 14));
        assert_eq!(w.start, d(2024, 2, 1));
        assert_eq!(w.end, d(2024, 2, 29));
        assert_eq!(w.text, "February 2024");
    }

    #[test]
    fn test_week_window_starts_monday() {
        // 2024-10-10 is a Thursday
        let w = DisplayWindow::containing(DateRangeKind::Week, d(2024, 10, 10));
        assert_eq!(w.start, d(2024, 10, 7));
        assert_eq!(w.end, d(2024, 10, 13));
        assert_eq!(w.text, "Oct 7 - Oct 13, 2024");
    }

    #[test]
    fn test_shift() {
        let w = DisplayWindow::containing(DateRangeKind::Month, d(2024, 1, 31));
        let next = w.shift(1);
        assert_eq!(next.start, d(2024, 2, 1));
        assert_eq!(next.end, d(2024, 2, 29));
        let prev = w.shift(-1);
        assert_eq!(prev.start, d(2023, 12, 1));
        let y = DisplayWindow::containing(DateRangeKind::Year, d(2024, 6, 1)).shift(-2);
        assert_eq!(y.start, d(2022, 1, 1));
        assert_eq!(y.end, d(2022, 12, 31));
    }

    #[test]
    fn test_reduce_login_logout() {
        let s = AppState::initial(d(2024, 10, 10));
        assert!(!s.is_authenticated);
        let logged_in = s.reduce(StateAction::LoggedIn {
            access_token: "abc".to_string(),
            user_id: Some("6700000000000000000000aa".to_string()),
        });
        assert!(logged_in.is_authenticated);
        assert_eq!(logged_in.access_token.as_deref(), Some("abc"));
        // the original snapshot is unchanged
        assert!(!s.is_authenticated);

        let logged_out = logged_in.reduce(StateAction::LoggedOut);
        assert!(!logged_out.is_authenticated);
        assert_eq!(logged_out.access_token, None);
        assert_eq!(logged_out.display_date_text, s.display_date_text);
    }

    #[test]
    fn test_reduce_display_range() {
        let s = AppState::initial(d(2024, 10, 10));
        let w = DisplayWindow::containing(DateRangeKind::Day, d(2024, 10, 1));
        let next = s.reduce(StateAction::DisplayRangeChanged(w.clone()));
        assert_eq!(next.display_window(), w);
    }
}
