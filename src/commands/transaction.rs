//! Transaction command handlers.

use crate::args::AddTransactionArgs;
use crate::commands::{resolve_category, settings, user_id, Out};
use crate::model::{Money, Transaction};
use crate::{utils, Config, Error, Result};

/// Creates a transaction in the user's currency. The kind is the kind of the category.
///
/// # Errors
/// - `Error::NotFound` if no category matches `args.category`
/// - `Error::Invalid` if the amount is negative or the note or tags are too long
pub async fn add_transaction(config: Config, args: AddTransactionArgs) -> Result<Out<Transaction>> {
    let db = config.db();
    if args.amount.is_sign_negative() {
        return Err(Error::invalid(
            "amount",
            "enter a positive amount, the category decides the sign",
        ));
    }
    let category = resolve_category(db, &args.category).await?;
    let currency = settings(db).await?.currency;
    let transaction = Transaction {
        id: utils::generate_id(),
        kind: category.kind,
        category_id: category.id,
        amount: Money::new(args.amount, currency),
        date: args.date.unwrap_or_else(utils::today),
        note: args.note,
        tags: args.tags,
        hidden: false,
        user_id: user_id(db).await?,
    };
    db.create_transaction(&transaction).await?;
    Ok(Out::new(
        format!(
            "Added {} on {} in '{}' with ID: {}",
            transaction.signed_amount().format(true),
            transaction.date,
            category.name,
            transaction.id
        ),
        transaction,
    ))
}

/// Sets or clears the hidden flag of a transaction.
pub async fn hide_transaction(config: Config, id: &str, hidden: bool) -> Result<Out<Transaction>> {
    let transaction = config.db().hide_transaction(id, hidden).await?;
    let verb = if hidden { "Hid" } else { "Restored" };
    Ok(Out::new(
        format!("{verb} transaction {}", transaction.id),
        transaction,
    ))
}
