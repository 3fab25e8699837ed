//! Recurring transaction command handlers.

use crate::args::{AddRecurringArgs, MaterializeArgs};
use crate::commands::{resolve_category, settings, user_id, Out};
use crate::model::{Money, Recurrence, RecurringTransaction, Transaction};
use crate::recurrence::{last_occurrence, LastOccurrence};
use crate::{utils, Config, Error, Result};

/// Stores a recurring rule. Nothing is materialized until `materialize` or `sync` runs.
pub async fn add_recurring(
    config: Config,
    args: AddRecurringArgs,
) -> Result<Out<RecurringTransaction>> {
    let db = config.db();
    if args.amount.is_sign_negative() {
        return Err(Error::invalid(
            "amount",
            "enter a positive amount, the category decides the sign",
        ));
    }
    let category = resolve_category(db, &args.category).await?;
    let mut recurrence = Recurrence::new(
        args.frequency,
        args.interval,
        args.start.unwrap_or_else(utils::today),
    );
    recurrence.end_date = args.end;
    let rule = RecurringTransaction {
        id: utils::generate_id(),
        kind: category.kind,
        category_id: category.id,
        amount: Money::new(args.amount, settings(db).await?.currency),
        note: args.note,
        tags: args.tags,
        user_id: user_id(db).await?,
        recurrence,
    };
    let rule = db.create_recurring(&rule).await?;
    Ok(Out::new(
        format!(
            "Added {} recurring transaction in '{}' with ID: {}",
            rule.recurrence.frequency, category.name, rule.id
        ),
        rule,
    ))
}

/// Creates the transactions of every occurrence due on or before `args.date`. Running it twice
/// for the same date creates nothing the second time.
pub async fn materialize(config: Config, args: MaterializeArgs) -> Result<Out<Vec<Transaction>>> {
    let now = args.date.unwrap_or_else(utils::today);
    let created = config.db().materialize_recurring(now).await?;
    Ok(Out::new(
        format!("Created {} transaction(s) due by {now}", created.len()),
        created,
    ))
}

pub async fn list_recurring(config: Config) -> Result<Out<Vec<RecurringTransaction>>> {
    let rules = config.db().recurring_transactions().await?;
    let mut message = format!("{} recurring transaction(s)", rules.len());
    for rule in &rules {
        let r = &rule.recurrence;
        let next = match r.next_date {
            Some(next) => format!("next {next}"),
            None => "finished".to_string(),
        };
        let last = match last_occurrence(r)? {
            LastOccurrence::Indefinite | LastOccurrence::Never => String::new(),
            LastOccurrence::On(date) => format!(", last {date}"),
        };
        message.push_str(&format!(
            "\n  {} every {} {} {}, {next}{last}",
            rule.id,
            r.interval,
            r.frequency,
            rule.amount.format(false)
        ));
    }
    Ok(Out::new(message, rules))
}
