use crate::api::{self, Mode};
use crate::commands::Out;
use crate::sync::{SyncEngine, SyncReport};
use crate::{utils, Config, Error, Result};
use tracing::debug;

/// Materializes due recurring transactions, then runs one sync cycle against the server.
///
/// # Errors
/// - `Error::SessionExpired` when nobody is logged in, or the server rejected the stored token
/// - any error the sync engine surfaces after its retry
pub async fn sync(config: Config, mode: Mode) -> Result<Out<SyncReport>> {
    let db = config.db().clone();
    let state = db.app_state().await?;
    if !state.is_authenticated {
        return Err(Error::SessionExpired);
    }

    let materialized = db.materialize_recurring(utils::today()).await?;
    if !materialized.is_empty() {
        debug!("Materialized {} recurring transaction(s)", materialized.len());
    }

    let remote = api::remote(&config, mode, state.access_token)?;
    let engine = SyncEngine::new(db, remote);
    let report = engine.sync().await?;
    Ok(Out::new(format!("Sync complete: {report}"), report))
}
