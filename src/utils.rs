use crate::{Error, Result};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// The on-disk and on-wire format of every calendar date. Zero-padded so that string order equals
/// date order.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Write a file.
pub(crate) async fn write(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
    let path = path.as_ref();
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Unable to write to {}", path.to_string_lossy()))?;
    Ok(())
}

/// Read a file to a `String`.
pub(crate) async fn read(path: &Path) -> Result<String> {
    let s = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at {}", path.display()))?;
    Ok(s)
}

/// Deserialize a JSON file into type `T`.
pub(crate) async fn deserialize<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = read(path).await?;
    let t = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON file at {}", path.display()))?;
    Ok(t)
}

/// Create a directory and any missing parents.
pub(crate) async fn make_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("Unable to create directory {}", path.display()))?;
    Ok(())
}

pub(crate) async fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let p = tokio::fs::canonicalize(path)
        .await
        .with_context(|| format!("Unable to canonicalize the path {}", path.display()))?;
    Ok(p)
}

/// The four-byte seconds prefix of an ObjectId. Instants outside 1970..2106 saturate.
pub(crate) fn id_seconds(timestamp: i64) -> u32 {
    u32::try_from(timestamp.clamp(0, i64::from(u32::MAX))).unwrap_or(u32::MAX)
}

/// Generates a new ObjectId-compatible identifier: four big-endian bytes of seconds since the
/// epoch followed by eight random bytes, rendered as 24 lowercase hex characters.
pub fn generate_id() -> String {
    let seconds = id_seconds(Utc::now().timestamp());
    let random = uuid::Uuid::new_v4();
    format!(
        "{}{}",
        hex::encode(seconds.to_be_bytes()),
        hex::encode(&random.as_bytes()[..8])
    )
}

/// Checks that `id` looks like an ObjectId: exactly 24 lowercase hex characters.
pub(crate) fn validate_id(id: &str) -> Result<()> {
    let ok = id.len() == 24
        && id
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    if ok {
        Ok(())
    } else {
        Err(Error::invalid(
            "id",
            format!("'{id}' is not a 24 character hex identifier"),
        ))
    }
}

/// Parses a zero-padded `yyyy-MM-dd` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    // chrono accepts unpadded fields, the stored format does not
    if s.len() != 10 {
        return Err(Error::invalid("date", format!("'{s}' is not a yyyy-MM-dd date")));
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| Error::invalid("date", format!("'{s}' is not a yyyy-MM-dd date: {e}")))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Today's date in the local timezone.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
