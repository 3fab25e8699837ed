use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory and:
/// - Creates an initial `config.json` file pointing at `server_url` along with default settings
/// - Creates an empty SQLite database with the current schema
///
/// # Arguments
/// - `home` - The directory that will be the root of data directory, e.g. `$HOME/expense-sync`
/// - `server_url` - The base URL of the expense server, e.g. `https://expenses.example.com/`
///
/// # Errors
/// - Returns an error if the URL is invalid, if a database already exists in `home`, or if any
///   file operation fails.
pub async fn init(home: &Path, server_url: &str) -> Result<Out<()>> {
    let config = Config::create(home, server_url)
        .await
        .context("Unable to create the data directory and configs")?;
    Ok(format!(
        "Successfully created the expense-sync directory at {}",
        config.root().display()
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_twice_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let home = dir.path().join("home");
        init(&home, "http://localhost:3000/").await.unwrap();
        assert!(Config::load(&home).await.is_ok());
        assert!(init(&home, "http://localhost:3000/").await.is_err());
    }
}
