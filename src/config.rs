//! Configuration file handling.
//!
//! The configuration file is stored at `$EXPENSE_SYNC_HOME/config.json` and holds the server
//! address and the request policy of the remote client. The local database lives next to it.

use crate::db::Db;
use crate::{utils, Error, Result};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const APP_NAME: &str = "expense-sync";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const EXPENSE_SQLITE: &str = "expense.sqlite";
const TEST_SERVER_JSON: &str = "test_server.json";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const REQUEST_RETRIES: u32 = 2;
const RETRY_BACKOFF_MS: u64 = 500;

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to the home directory and from there it loads `config.json` and opens the database.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the home directory, an initial `config.json` pointing at `server_url`, and a new
    /// SQLite database.
    ///
    /// # Errors
    /// - Returns an error if `server_url` is not a valid URL, if a database already exists or if
    ///   any file operation fails.
    pub async fn create(dir: impl Into<PathBuf>, server_url: &str) -> Result<Self> {
        let server_url = parse_server_url(server_url)?;

        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;
        let config_path = root.join(CONFIG_JSON);

        let config_file = ConfigFile {
            server_url: server_url.to_string(),
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        let sqlite_path = root.join(EXPENSE_SQLITE);
        let db = Db::init(&sqlite_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    /// This will
    /// - validate that the home directory and the config file exist
    /// - load and validate the config file
    /// - open the SQLite database, running any pending migrations
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The home directory is missing, run 'expense-sync init' first")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            return Err(anyhow!("The config file is missing '{}'", config_path.display()).into());
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let sqlite_path = root.join(EXPENSE_SQLITE);
        let db = Db::load(&sqlite_path)
            .await
            .context("Unable to load SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn server_url(&self) -> &str {
        &self.config_file.server_url
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config_file.request_timeout_secs)
    }

    /// How many times a failed request is retried before the failure is surfaced.
    pub fn request_retries(&self) -> u32 {
        self.config_file.request_retries
    }

    /// The delay before the first retry. Retry `n` waits `n` times this long.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.config_file.retry_backoff_ms)
    }

    /// Where the in-memory test server keeps its data between runs in test mode.
    pub fn test_server_path(&self) -> PathBuf {
        self.root.join(TEST_SERVER_JSON)
    }
}

fn parse_server_url(s: &str) -> Result<Url> {
    let url = Url::parse(s).with_context(|| format!("'{s}' is not a valid server URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::invalid(
            "server_url",
            format!("'{s}' must be an http or https URL"),
        ));
    }
    Ok(url)
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "expense-sync",
///   "config_version": 1,
///   "server_url": "https://expenses.example.com/",
///   "request_timeout_secs": 10,
///   "request_retries": 2,
///   "retry_backoff_ms": 500
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "expense-sync"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// The base URL of the expense server
    server_url: String,

    #[serde(default = "default_timeout")]
    request_timeout_secs: u64,

    #[serde(default = "default_retries")]
    request_retries: u32,

    #[serde(default = "default_backoff")]
    retry_backoff_ms: u64,
}

fn default_timeout() -> u64 {
    REQUEST_TIMEOUT_SECS
}

fn default_retries() -> u32 {
    REQUEST_RETRIES
}

fn default_backoff() -> u64 {
    RETRY_BACKOFF_MS
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            server_url: String::new(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            request_retries: REQUEST_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile from the specified path and validates `app_name`.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;
        if config.app_name != APP_NAME {
            return Err(anyhow!(
                "Invalid app_name in config file: expected '{}', got '{}'",
                APP_NAME,
                config.app_name
            )
            .into());
        }
        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_then_load() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        let created = Config::create(&home, "https://expenses.example.com/")
            .await
            .unwrap();
        assert!(created.sqlite_path().is_file());
        drop(created);

        let loaded = Config::load(&home).await.unwrap();
        assert_eq!(loaded.server_url(), "https://expenses.example.com/");
        assert_eq!(loaded.request_timeout(), Duration::from_secs(10));
        assert_eq!(loaded.request_retries(), 2);
        assert_eq!(loaded.retry_backoff(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_load_missing_home() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(dir.path().join("nope")).await.is_err());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_url() {
        let dir = TempDir::new().unwrap();
        assert!(Config::create(dir.path().join("a"), "not a url").await.is_err());
        assert!(Config::create(dir.path().join("b"), "ftp://example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_config_file_defaults_and_app_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);
        utils::write(
            &path,
            r#"{"app_name": "expense-sync", "config_version": 1, "server_url": "http://x"}"#,
        )
        .await
        .unwrap();
        let loaded = ConfigFile::load(&path).await.unwrap();
        assert_eq!(loaded.request_retries, REQUEST_RETRIES);

        utils::write(
            &path,
            r#"{"app_name": "other-app", "config_version": 1, "server_url": "http://x"}"#,
        )
        .await
        .unwrap();
        assert!(ConfigFile::load(&path).await.is_err());
    }
}
