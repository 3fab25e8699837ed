//! The read-only views: `list` and `summary`.
//!
//! Both work on a date window. The window is the one stored in the app state unless the
//! arguments pick another, in which case the new window is stored for next time.

use crate::args::WindowArgs;
use crate::commands::{settings, Out};
use crate::db::{Db, TransactionQuery};
use crate::model::{Currency, DisplayWindow, Money, StateAction, Transaction};
use crate::view::{
    displayed_transactions, group_by_category, group_by_date, within_dates, DateGroup,
    PeriodTotals,
};
use crate::{utils, Config, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub window: DisplayWindow,
    pub groups: Vec<DateGroup>,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub window: DisplayWindow,
    pub totals: PeriodTotals,
    pub categories: Vec<CategoryTotal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryTotal {
    pub category_id: String,
    pub name: String,
    pub count: usize,
    pub total: Decimal,
}

/// The displayed transactions of the window, newest first, grouped by date.
pub async fn list(config: Config, args: WindowArgs) -> Result<Out<Listing>> {
    list_on(config.db(), &args, utils::today()).await
}

/// Income, expense and net totals of the window plus the share of each category.
pub async fn summary(config: Config, args: WindowArgs) -> Result<Out<Summary>> {
    summary_on(config.db(), &args, utils::today()).await
}

async fn list_on(db: &Db, args: &WindowArgs, today: NaiveDate) -> Result<Out<Listing>> {
    let window = select_window(db, args, today).await?;
    let (shown, currency) = displayed(db, &window, today).await?;
    let groups = group_by_date(&shown);
    let total = groups.iter().map(|g| g.total).sum::<Decimal>();

    let mut message = format!(
        "{}: {} transaction(s), balance {}",
        window.text,
        shown.len(),
        Money::new(total, currency.clone()).format(true)
    );
    for group in &groups {
        message.push_str(&format!(
            "\n{}  {}",
            group.date,
            Money::new(group.total, currency.clone()).format(true)
        ));
        for t in &group.transactions {
            let note = t.note.as_deref().unwrap_or("");
            message.push_str(&format!(
                "\n    {} {:>12} {note}",
                t.id,
                t.signed_amount().format(true)
            ));
        }
    }
    Ok(Out::new(
        message,
        Listing {
            window,
            groups,
            total,
        },
    ))
}

async fn summary_on(db: &Db, args: &WindowArgs, today: NaiveDate) -> Result<Out<Summary>> {
    let window = select_window(db, args, today).await?;
    let (shown, currency) = displayed(db, &window, today).await?;
    let totals = PeriodTotals::of(&shown);
    let names: HashMap<String, String> = db
        .categories(true)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let categories: Vec<CategoryTotal> = group_by_category(&shown)
        .into_iter()
        .map(|b| CategoryTotal {
            name: names.get(&b.category_id).cloned().unwrap_or_default(),
            category_id: b.category_id,
            count: b.count,
            total: b.total,
        })
        .collect();

    let money = |value: Decimal| Money::new(value, currency.clone());
    let mut message = format!(
        "{}: income {}, expense {}, net {}",
        window.text,
        money(totals.income).format(false),
        money(totals.expense).format(false),
        money(totals.net).format(true)
    );
    for c in &categories {
        message.push_str(&format!(
            "\n  {:<20} {:>4} {:>12}",
            c.name,
            c.count,
            money(c.total).format(true)
        ));
    }
    Ok(Out::new(
        message,
        Summary {
            window,
            totals,
            categories,
        },
    ))
}

/// Resolves the window from the arguments and the stored state, storing it when it changed.
async fn select_window(db: &Db, args: &WindowArgs, today: NaiveDate) -> Result<DisplayWindow> {
    let stored = db.app_state().await?.display_window();
    let mut window = if args.range.is_some() || args.date.is_some() {
        DisplayWindow::containing(
            args.range.unwrap_or(stored.kind),
            args.date.unwrap_or(today),
        )
    } else {
        stored.clone()
    };
    if let Some(steps) = args.shift {
        window = window.shift(steps);
    }
    if window != stored {
        db.dispatch(StateAction::DisplayRangeChanged(window.clone()))
            .await?;
    }
    Ok(window)
}

/// The transactions of `window` that pass the visibility filter, and the currency they are in.
async fn displayed(
    db: &Db,
    window: &DisplayWindow,
    today: NaiveDate,
) -> Result<(Vec<Transaction>, Currency)> {
    let settings = settings(db).await?;
    let categories = db.categories(true).await?;
    // newest first
    let all = db.transactions(&TransactionQuery::default()).await?;
    let rows = within_dates(&all, window.start, window.end);
    let shown = displayed_transactions(rows, &categories, &settings, today);
    Ok((shown, settings.currency))
}
