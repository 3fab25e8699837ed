//! The sync engine: pulls remote changes into the local store, then pushes local changes out.
//!
//! A cycle is `Idle -> Pulling -> Pushing -> Idle`. A cycle that fails with a transient error
//! (network or server) is run once more from the start before the error is surfaced. An expired
//! session is never retried: the stored session is cleared and `Error::SessionExpired` returned.

use crate::api::Remote;
use crate::db::Db;
use crate::model::StateAction;
use crate::{Error, Result};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// How many times a cycle runs before a transient failure is surfaced.
const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Pulling,
    Pushing,
    Failed,
}

serde_plain::derive_display_from_serialize!(SyncState);

/// The outcome of a successful `sync`.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct SyncReport {
    /// Rows written or removed locally by the pull.
    pub pulled: usize,
    /// Rows sent by the push.
    pub pushed: usize,
    /// The watermark after the cycle.
    pub watermark: i64,
    /// How many cycles were run, 1 unless the first one failed.
    pub attempts: u32,
}

impl Display for SyncReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pulled {} change(s), pushed {} change(s)",
            self.pulled, self.pushed
        )
    }
}

/// Drives sync cycles between one local store and one remote.
pub struct SyncEngine {
    db: Db,
    remote: Arc<dyn Remote>,
    in_flight: AtomicBool,
    state: Mutex<SyncState>,
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    pub fn new(db: Db, remote: Arc<dyn Remote>) -> Self {
        Self {
            db,
            remote,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SyncState) {
        debug!("Sync state: {state}");
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Runs a pull+push cycle, retrying it once on a transient failure.
    ///
    /// # Errors
    /// - `Error::SyncInProgress` if another call has not finished yet
    /// - `Error::SessionExpired` if the server rejected the token; the local session is cleared
    /// - the last error of the final attempt otherwise
    pub async fn sync(&self) -> Result<SyncReport> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(Error::SyncInProgress);
        }
        let _in_flight = InFlight(&self.in_flight);

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.cycle().await {
                Ok(mut report) => {
                    report.attempts = attempts;
                    self.set_state(SyncState::Idle);
                    info!("Sync finished: {report}");
                    return Ok(report);
                }
                Err(Error::SessionExpired) => {
                    self.set_state(SyncState::Failed);
                    warn!("The session has expired, logging out");
                    self.remote.set_access_token(None);
                    self.db.dispatch(StateAction::LoggedOut).await?;
                    return Err(Error::SessionExpired);
                }
                Err(e) if e.is_retryable() && attempts < MAX_ATTEMPTS => {
                    warn!("Sync attempt {attempts} failed, retrying: {e}");
                }
                Err(e) => {
                    self.set_state(SyncState::Failed);
                    return Err(e);
                }
            }
        }
    }

    async fn cycle(&self) -> Result<SyncReport> {
        self.set_state(SyncState::Pulling);
        let last_pulled_at = self.db.last_pulled_at().await?;
        let pull = self.remote.pull_changes(last_pulled_at).await?;
        debug!(
            "Pulled {} change(s) since {last_pulled_at:?}",
            pull.changes.len()
        );
        // the watermark moves inside the same write transaction as the rows
        let pulled = self.db.apply_pulled(&pull.changes, pull.timestamp).await?;

        self.set_state(SyncState::Pushing);
        let pending = self.db.pending_changes().await?;
        let pushed = if pending.is_empty() {
            debug!("Nothing to push");
            0
        } else {
            self.remote
                .push_changes(&pending.changes, Some(pull.timestamp))
                .await?;
            let acknowledged = self.db.acknowledge_push(&pending.sent).await?;
            debug!(
                "Pushed {} row(s), {acknowledged} unchanged since",
                pending.sent.len()
            );
            pending.sent.len()
        };

        Ok(SyncReport {
            pulled,
            pushed,
            watermark: pull.timestamp,
            attempts: 0,
        })
    }
}
