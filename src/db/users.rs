use crate::db::changes::{fetch_record, write_record, Record, RowStatus, UserRecord, WriteMode};
use crate::db::{Db, Table};
use crate::model::{Settings, User};
use crate::{Error, Result};
use tracing::debug;

impl Db {
    /// Stores the authenticated user as fetched from the server. Any other user row is removed
    /// because the device holds one session at a time.
    pub async fn save_user(&self, user: &User) -> Result<()> {
        let mut tx = self.begin_write().await?;
        let revision = tx.revision();
        sqlx::query("DELETE FROM users WHERE id != ?")
            .bind(user.id.as_str())
            .execute(&mut *tx.conn())
            .await?;
        write_record(
            tx.conn(),
            &UserRecord::from(user),
            WriteMode::Upsert,
            RowStatus::Synced,
            revision,
        )
        .await?;
        tx.touch(Table::Users);
        tx.commit().await?;
        debug!("Saved user {}", user.id);
        Ok(())
    }

    /// The signed-in user, if one has been saved.
    pub async fn current_user(&self) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY id LIMIT 1",
            UserRecord::COLUMNS.join(", ")
        );
        let row = sqlx::query(&sql).fetch_optional(self.pool()).await?;
        row.as_ref()
            .map(|row| UserRecord::from_row(row).and_then(User::try_from))
            .transpose()
    }

    pub async fn find_user(&self, id: &str) -> Result<User> {
        let mut conn = self.pool().acquire().await?;
        fetch_record::<UserRecord>(&mut conn, id)
            .await?
            .ok_or_else(|| Error::not_found("user", id))?
            .try_into()
    }

    /// Applies `mutator` to the signed-in user's settings and marks the row for push.
    pub async fn update_settings<F>(&self, mutator: F) -> Result<User>
    where
        F: FnOnce(&mut Settings) + Send,
    {
        let mut tx = self.begin_write().await?;
        let revision = tx.revision();
        let sql = format!(
            "SELECT {} FROM users ORDER BY id LIMIT 1",
            UserRecord::COLUMNS.join(", ")
        );
        let row = sqlx::query(&sql)
            .fetch_optional(&mut *tx.conn())
            .await?
            .ok_or_else(|| Error::not_found("user", "current"))?;
        let mut user = User::try_from(UserRecord::from_row(&row)?)?;
        mutator(&mut user.settings);

        write_record(
            tx.conn(),
            &UserRecord::from(&user),
            WriteMode::Upsert,
            RowStatus::Updated,
            revision,
        )
        .await?;
        tx.touch(Table::Users);
        tx.commit().await?;
        Ok(user)
    }

    /// Removes the stored user. Used at logout.
    pub async fn clear_user(&self) -> Result<()> {
        let mut tx = self.begin_write().await?;
        sqlx::query("DELETE FROM users")
            .execute(&mut *tx.conn())
            .await?;
        tx.touch(Table::Users);
        tx.commit().await
    }
}
