use crate::db::{Db, Table};
use crate::model::{AppState, DateRangeKind, StateAction, APP_STATE_ID};
use crate::utils::{format_date, parse_date};
use crate::Result;
use anyhow::Context;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;
use tracing::debug;

fn from_row(row: &SqliteRow) -> Result<AppState> {
    let range: &str = row.try_get("display_date_range")?;
    Ok(AppState {
        is_authenticated: row.try_get("is_authenticated")?,
        access_token: row.try_get("access_token")?,
        user_id: row.try_get("user_id")?,
        display_date_range: DateRangeKind::from_str(range)
            .with_context(|| format!("Unknown date range '{range}'"))?,
        display_date_start: parse_date(row.try_get("display_date_start")?)?,
        display_date_end: parse_date(row.try_get("display_date_end")?)?,
        display_date_text: row.try_get("display_date_text")?,
    })
}

async fn read(conn: &mut SqliteConnection) -> Result<Option<AppState>> {
    let row = sqlx::query("SELECT * FROM state WHERE id = ?")
        .bind(APP_STATE_ID)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(from_row).transpose()
}

async fn write(conn: &mut SqliteConnection, state: &AppState) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO state (id, is_authenticated, access_token, user_id, \
        display_date_range, display_date_start, display_date_end, display_date_text) \
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(APP_STATE_ID)
    .bind(state.is_authenticated)
    .bind(state.access_token.as_deref())
    .bind(state.user_id.as_deref())
    .bind(state.display_date_range.to_string())
    .bind(format_date(state.display_date_start))
    .bind(format_date(state.display_date_end))
    .bind(state.display_date_text.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Db {
    /// Creates the app-state singleton if it does not exist yet.
    pub(super) async fn ensure_app_state(&self, today: NaiveDate) -> Result<()> {
        let mut tx = self.begin_write().await?;
        if read(tx.conn()).await?.is_none() {
            debug!("Creating the app state");
            write(tx.conn(), &AppState::initial(today)).await?;
            tx.touch(Table::State);
        }
        tx.commit().await
    }

    /// The current app-state snapshot.
    pub async fn app_state(&self) -> Result<AppState> {
        let mut conn = self.pool().acquire().await?;
        read(&mut conn)
            .await?
            .with_context(|| "The app state is missing")
            .map_err(Into::into)
    }

    /// Reduces the stored state with `action` and persists the result in one write transaction.
    pub async fn dispatch(&self, action: StateAction) -> Result<AppState> {
        let mut tx = self.begin_write().await?;
        let current = read(tx.conn())
            .await?
            .with_context(|| "The app state is missing")?;
        let next = current.reduce(action);
        write(tx.conn(), &next).await?;
        tx.touch(Table::State);
        tx.commit().await?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DisplayWindow;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_state_is_created_once_and_survives_reopen() {
        let env = TestEnv::new().await;
        let db = env.db();
        let initial = db.app_state().await.unwrap();
        assert!(!initial.is_authenticated);
        assert_eq!(initial.display_date_range, DateRangeKind::Month);

        let next = db
            .dispatch(StateAction::LoggedIn {
                access_token: "token".to_string(),
                user_id: None,
            })
            .await
            .unwrap();
        assert!(next.is_authenticated);

        let reopened = Db::load(env.config().sqlite_path()).await.unwrap();
        assert_eq!(reopened.app_state().await.unwrap(), next);
    }

    #[tokio::test]
    async fn test_dispatch_display_range() {
        let env = TestEnv::new().await;
        let db = env.db();
        let window = DisplayWindow::containing(
            DateRangeKind::Week,
            NaiveDate::from_ymd_opt(2024, 10, 10).unwrap(),
        );
        let next = db
            .dispatch(StateAction::DisplayRangeChanged(window.clone()))
            .await
            .unwrap();
        assert_eq!(next.display_window(), window);
        assert_eq!(db.app_state().await.unwrap().display_window(), window);
    }
}
