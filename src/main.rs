use clap::Parser;
use expense_sync::args::{Args, CategoryCommand, Command, RecurringCommand, TransactionCommand};
use expense_sync::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().home().path();

    // This allows for running the program without a server. When EXPENSE_SYNC_IN_TEST_MODE is
    // set and non-zero in length, then the mode will be Mode::Test, otherwise it will be
    // Mode::Http.
    let mode = Mode::from_env();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args.server_url()).await?.print(),

        Command::Login(login_args) => {
            let config = Config::load(home).await?;
            commands::login(config, mode, login_args.clone())
                .await?
                .print()
        }

        Command::Logout => commands::logout(Config::load(home).await?, mode)
            .await?
            .print(),

        Command::Sync => commands::sync(Config::load(home).await?, mode)
            .await?
            .print(),

        Command::Category(category) => {
            let config = Config::load(home).await?;
            match category {
                CategoryCommand::Add(args) => {
                    commands::add_category(config, args.clone()).await?.print()
                }
                CategoryCommand::Hide(args) => commands::hide_category(config, &args.id, true)
                    .await?
                    .print(),
                CategoryCommand::Unhide(args) => commands::hide_category(config, &args.id, false)
                    .await?
                    .print(),
                CategoryCommand::List(args) => commands::list_categories(config, args.clone())
                    .await?
                    .print(),
            }
        }

        Command::Transaction(transaction) => {
            let config = Config::load(home).await?;
            match transaction {
                TransactionCommand::Add(args) => commands::add_transaction(config, args.clone())
                    .await?
                    .print(),
                TransactionCommand::Hide(args) => {
                    commands::hide_transaction(config, &args.id, true)
                        .await?
                        .print()
                }
                TransactionCommand::Unhide(args) => {
                    commands::hide_transaction(config, &args.id, false)
                        .await?
                        .print()
                }
            }
        }

        Command::Recurring(recurring) => {
            let config = Config::load(home).await?;
            match recurring {
                RecurringCommand::Add(args) => commands::add_recurring(config, args.clone())
                    .await?
                    .print(),
                RecurringCommand::Materialize(args) => {
                    commands::materialize(config, args.clone()).await?.print()
                }
                RecurringCommand::List => commands::list_recurring(config).await?.print(),
            }
        }

        Command::List(window_args) => {
            let config = Config::load(home).await?;
            commands::list(config, window_args.clone()).await?.print()
        }

        Command::Summary(window_args) => {
            let config = Config::load(home).await?;
            commands::summary(config, window_args.clone())
                .await?
                .print()
        }

        Command::Import(import_args) => {
            let config = Config::load(home).await?;
            commands::import(config, import_args.clone()).await?.print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
