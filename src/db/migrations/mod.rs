//! Database schema migrations.
//!
//! Migration files are stored in this directory with the naming convention:
//! - `migration_NN_up.sql` - Upgrades schema from version `NN-1` to version `NN`
//! - `migration_NN_down.sql` - Downgrades schema from version `NN` to version `NN-1`
//!
//! Up migrations only ever add to the schema so that rows written by an older version survive.

use crate::{Error, Result};
use anyhow::Context;
use sqlx::{Executor, SqlitePool};
use tracing::debug;

/// A database migration with up and down SQL.
struct Migration {
    /// The version this migration brings the database to (when going up).
    version: i32,
    /// SQL to execute when upgrading to this version.
    up_sql: &'static str,
    /// SQL to execute when downgrading from this version.
    down_sql: &'static str,
}

/// All available migrations in order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        up_sql: include_str!("migration_01_up.sql"),
        down_sql: include_str!("migration_01_down.sql"),
    },
    Migration {
        version: 2,
        up_sql: include_str!("migration_02_up.sql"),
        down_sql: include_str!("migration_02_down.sql"),
    },
];

/// Runs migrations to bring the database from `current_ver` to `target_ver`, one version at a
/// time, each in its own transaction together with the `schema_version` update.
///
/// Validates all required migrations exist before running any of them.
pub(super) async fn run(pool: &SqlitePool, current_ver: i32, target_ver: i32) -> Result<()> {
    if current_ver == target_ver {
        debug!("Database already at target version {target_ver}, no migrations needed");
        return Ok(());
    }

    validate_migrations(current_ver, target_ver)?;

    if current_ver < target_ver {
        for version in (current_ver + 1)..=target_ver {
            let migration = find(version)?;
            debug!("Running migration {version:02} (up)");
            run_single_migration(pool, migration.up_sql, version).await?;
        }
    } else {
        for version in (target_ver + 1..=current_ver).rev() {
            let migration = find(version)?;
            debug!("Running migration {version:02} (down)");
            run_single_migration(pool, migration.down_sql, version - 1).await?;
        }
    }

    debug!("Migration complete, schema now at version {target_ver}");
    Ok(())
}

fn find(version: i32) -> Result<&'static Migration> {
    MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .with_context(|| format!("Migration {version} not found"))
        .map_err(Error::from)
}

/// Executes a single migration's SQL and updates schema_version, all within a transaction.
async fn run_single_migration(pool: &SqlitePool, sql: &str, new_version: i32) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin migration transaction")?;

    (&mut *tx)
        .execute(sql)
        .await
        .context("Failed to execute migration SQL")?;

    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .context("Failed to clear schema_version")?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(new_version)
        .execute(&mut *tx)
        .await
        .context("Failed to update schema_version")?;

    tx.commit()
        .await
        .context("Failed to commit migration transaction")?;

    Ok(())
}

/// Validates that migrations are available for all versions needed to go from
/// `current_version` to `target_version`.
fn validate_migrations(current_version: i32, target_version: i32) -> Result<()> {
    let (start, end) = if current_version < target_version {
        (current_version + 1, target_version)
    } else {
        (target_version + 1, current_version)
    };

    for version in start..=end {
        if !MIGRATIONS.iter().any(|m| m.version == version) {
            return Err(anyhow::anyhow!(
                "Migration {version} is missing but required to migrate from version \
                {current_version} to {target_version}"
            )
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;
    use tempfile::TempDir;

    /// Helper to create a test database with schema_version bootstrapped at version 0.
    async fn create_test_db() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.sqlite");

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .unwrap()
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&pool)
            .await
            .unwrap();

        (temp_dir, pool)
    }

    async fn get_schema_version(pool: &SqlitePool) -> i32 {
        let row: (i32,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await
            .unwrap();
        row.0
    }

    async fn table_exists(pool: &SqlitePool, table_name: &str) -> bool {
        let row: (i32,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table_name)
                .fetch_one(pool)
                .await
                .unwrap();
        row.0 > 0
    }

    #[tokio::test]
    async fn test_migration_up_creates_tables() {
        let (_temp_dir, pool) = create_test_db().await;
        assert_eq!(get_schema_version(&pool).await, 0);

        run(&pool, 0, 2).await.unwrap();

        assert_eq!(get_schema_version(&pool).await, 2);
        for table in [
            "categories",
            "transactions",
            "users",
            "state",
            "sync_meta",
            "recurring_transactions",
        ] {
            assert!(table_exists(&pool, table).await, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn test_migration_down_drops_tables() {
        let (_temp_dir, pool) = create_test_db().await;
        run(&pool, 0, 2).await.unwrap();

        run(&pool, 2, 1).await.unwrap();
        assert_eq!(get_schema_version(&pool).await, 1);
        assert!(!table_exists(&pool, "recurring_transactions").await);
        assert!(table_exists(&pool, "transactions").await);

        run(&pool, 1, 0).await.unwrap();
        assert_eq!(get_schema_version(&pool).await, 0);
        assert!(!table_exists(&pool, "transactions").await);
        assert!(!table_exists(&pool, "categories").await);
    }

    #[tokio::test]
    async fn test_version_bump_keeps_rows() {
        let (_temp_dir, pool) = create_test_db().await;
        run(&pool, 0, 1).await.unwrap();
        sqlx::query(
            "INSERT INTO categories (id, name, icon, kind, color) \
            VALUES ('673cb70801452339cd5b4ec1', 'Food', 'food', 'expense', '#f00')",
        )
        .execute(&pool)
        .await
        .unwrap();

        run(&pool, 1, 2).await.unwrap();

        let (name,): (String,) = sqlx::query_as("SELECT name FROM categories WHERE id = ?")
            .bind("673cb70801452339cd5b4ec1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "Food");
    }

    #[tokio::test]
    async fn test_migration_no_op_when_already_at_target() {
        let (_temp_dir, pool) = create_test_db().await;
        run(&pool, 0, 2).await.unwrap();
        run(&pool, 2, 2).await.unwrap();
        assert_eq!(get_schema_version(&pool).await, 2);
    }

    #[test]
    fn test_validate_migrations_succeeds_for_valid_range() {
        assert!(validate_migrations(0, 2).is_ok());
        assert!(validate_migrations(2, 0).is_ok());
    }

    #[test]
    fn test_validate_migrations_fails_for_missing_migration() {
        assert!(validate_migrations(0, 3).is_err());
        assert!(validate_migrations(2, 4).is_err());
    }
}
