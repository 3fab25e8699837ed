//! Implements `Remote` over HTTP with `reqwest`.

use crate::api::{AccessToken, Credentials, Hidden, PasswordChange, Remote};
use crate::db::{ChangeSet, PullResponse};
use crate::error::SERVER_NOT_AVAILABLE;
use crate::model::{Category, NewAccount, Transaction, User};
use crate::utils::format_date;
use crate::{Config, Error, Result};
use anyhow::Context;
use chrono::NaiveDate;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

const SYNC_PATH: &str = "api/sync/watermelon";

/// Talks to the expense server at `base`. Requests time out after the configured duration and are
/// retried with a linearly growing delay when the network fails or the server answers with a 5xx.
#[derive(Debug)]
pub struct HttpRemote {
    client: reqwest::Client,
    base: Url,
    token: RwLock<Option<String>>,
    retries: u32,
    backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpRemote {
    pub fn new(base: &str, timeout: Duration, retries: u32, backoff: Duration) -> Result<Self> {
        let mut base = Url::parse(base).with_context(|| format!("Invalid server URL '{base}'"))?;
        // `Url::join` replaces the last path segment unless the path ends with a slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Unable to build the HTTP client")?;
        Ok(Self {
            client,
            base,
            token: RwLock::new(None),
            retries,
            backoff,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.server_url(),
            config.request_timeout(),
            config.request_retries(),
            config.retry_backoff(),
        )
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self
            .base
            .join(path)
            .with_context(|| format!("Unable to build a URL for '{path}'"))?)
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sends the request, retrying network failures and 5xx answers, and maps any failure to the
    /// error taxonomy.
    async fn send<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .context("Unable to serialize the request body")?;
        let token = self.token();
        let mut attempt = 0;
        loop {
            trace!("{method} {url} (attempt {})", attempt + 1);
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .header(CONTENT_TYPE, "application/json");
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }
            let outcome = request.send().await;
            let retryable = match &outcome {
                Ok(response) => response.status().is_server_error(),
                Err(_) => true,
            };
            if retryable && attempt < self.retries {
                attempt += 1;
                let delay = self.backoff * attempt;
                match &outcome {
                    Ok(response) => warn!(
                        "{method} {url} answered {}, retrying in {delay:?}",
                        response.status()
                    ),
                    Err(e) => warn!("{method} {url} failed ({e}), retrying in {delay:?}"),
                }
                tokio::time::sleep(delay).await;
                continue;
            }
            return match outcome {
                Ok(response) => check(response).await,
                Err(e) => {
                    debug!("{method} {url} failed: {e}");
                    Err(Error::network_unavailable())
                }
            };
        }
    }

    async fn json<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|e| {
            debug!("Unable to decode the response body: {e}");
            Error::Server {
                status,
                message: SERVER_NOT_AVAILABLE.to_string(),
            }
        })
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_from(status, &body))
}

/// Maps a non-success answer to an error. A 403 means the session is over. Otherwise the
/// message comes from a JSON `{"message": ...}` body, or is the generic one when the body is not
/// JSON.
fn error_from(status: StatusCode, body: &str) -> Error {
    if status == StatusCode::FORBIDDEN {
        return Error::SessionExpired;
    }
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| SERVER_NOT_AVAILABLE.to_string());
    Error::Server {
        status: status.as_u16(),
        message,
    }
}

#[async_trait::async_trait]
impl Remote for HttpRemote {
    fn set_access_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    async fn get_user(&self) -> Result<User> {
        let mut url = self.url("api/auth/user")?;
        url.query_pairs_mut().append_pair("expanded", "true");
        let response = self.send::<()>(Method::GET, url, None).await?;
        self.json(response).await
    }

    async fn login(&self, credentials: &Credentials) -> Result<AccessToken> {
        let url = self.url("api/auth/login")?;
        let response = self.send(Method::POST, url, Some(credentials)).await?;
        self.json(response).await
    }

    async fn create_user(&self, account: &NewAccount) -> Result<()> {
        let url = self.url("api/auth/user")?;
        self.send(Method::POST, url, Some(account)).await?;
        Ok(())
    }

    async fn change_user_password(&self, user_id: &str, change: &PasswordChange) -> Result<()> {
        let url = self.url(&format!("api/auth/user/{user_id}/password"))?;
        self.send(Method::POST, url, Some(change)).await?;
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        let url = self.url("api/auth/logout")?;
        self.send::<()>(Method::POST, url, None).await?;
        Ok(())
    }

    async fn create_category(&self, category: &Category) -> Result<Category> {
        let url = self.url("api/categories")?;
        let response = self.send(Method::POST, url, Some(category)).await?;
        self.json(response).await
    }

    async fn hide_category(&self, id: &str, hidden: bool) -> Result<()> {
        let url = self.url(&format!("api/categories/{id}/hidden"))?;
        self.send(Method::PUT, url, Some(&Hidden { hidden })).await?;
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> Result<()> {
        let url = self.url(&format!("api/categories/{}", category.id))?;
        self.send(Method::PUT, url, Some(category)).await?;
        Ok(())
    }

    async fn get_transactions(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>> {
        let mut url = self.url("api/transactions")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("expanded", "true");
            if let Some(from) = from {
                query.append_pair("from", &format_date(from));
            }
            if let Some(to) = to {
                query.append_pair("to", &format_date(to));
            }
        }
        let response = self.send::<()>(Method::GET, url, None).await?;
        self.json(response).await
    }

    async fn create_transaction(&self, transaction: &Transaction) -> Result<Transaction> {
        let url = self.url("api/transactions")?;
        let response = self.send(Method::POST, url, Some(transaction)).await?;
        self.json(response).await
    }

    async fn hide_transaction(&self, id: &str, hidden: bool) -> Result<()> {
        let url = self.url(&format!("api/transactions/{id}/hidden"))?;
        self.send(Method::PUT, url, Some(&Hidden { hidden })).await?;
        Ok(())
    }

    async fn update_transaction(&self, transaction: &Transaction) -> Result<()> {
        let url = self.url(&format!("api/transactions/{}", transaction.id))?;
        self.send(Method::PUT, url, Some(transaction)).await?;
        Ok(())
    }

    async fn pull_changes(&self, last_pulled_at: Option<i64>) -> Result<PullResponse> {
        let url = self.sync_url(last_pulled_at)?;
        let response = self.send::<()>(Method::GET, url, None).await?;
        self.json(response).await
    }

    async fn push_changes(&self, changes: &ChangeSet, last_pulled_at: Option<i64>) -> Result<()> {
        let url = self.sync_url(last_pulled_at)?;
        self.send(Method::POST, url, Some(changes)).await?;
        Ok(())
    }
}

impl HttpRemote {
    /// The sync endpoint with the watermark as a query parameter. A device that never pulled
    /// sends `null`.
    fn sync_url(&self, last_pulled_at: Option<i64>) -> Result<Url> {
        let mut url = self.url(SYNC_PATH)?;
        let value = last_pulled_at
            .map(|t| t.to_string())
            .unwrap_or_else(|| "null".to_string());
        url.query_pairs_mut().append_pair("lastPulledAt", &value);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn remote(base: &str) -> HttpRemote {
        HttpRemote::new(base, Duration::from_secs(1), 0, Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn test_urls_keep_the_base_path() {
        let r = remote("https://example.com/expenses");
        assert_eq!(
            r.url("api/transactions").unwrap().as_str(),
            "https://example.com/expenses/api/transactions"
        );
        assert_eq!(
            r.sync_url(Some(42)).unwrap().as_str(),
            "https://example.com/expenses/api/sync/watermelon?lastPulledAt=42"
        );
        assert_eq!(
            remote("http://localhost:3000/")
                .sync_url(None)
                .unwrap()
                .as_str(),
            "http://localhost:3000/api/sync/watermelon?lastPulledAt=null"
        );
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            error_from(StatusCode::FORBIDDEN, r#"{"message": "jwt expired"}"#),
            Error::SessionExpired
        ));
        match error_from(StatusCode::CONFLICT, r#"{"message": "Email already in use"}"#) {
            Error::Server { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "Email already in use");
            }
            other => panic!("unexpected {other:?}"),
        }
        match error_from(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>") {
            Error::Server { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, SERVER_NOT_AVAILABLE);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    /// Answers every request with a 502 and counts the requests.
    async fn bad_gateway() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 11\r\n\
                        Connection: close\r\n\r\nbad gateway",
                    )
                    .await;
                let _ = socket.shutdown().await;
            }
        });
        (base, requests)
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_with_linear_backoff() {
        let (base, requests) = bad_gateway().await;
        let backoff = Duration::from_millis(20);
        let r = HttpRemote::new(&base, Duration::from_secs(5), 2, backoff).unwrap();

        let started = Instant::now();
        let err = r.logout().await.unwrap_err();

        // one request plus two retries, waiting 1x then 2x the backoff
        assert_eq!(requests.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= backoff * 3);
        match err {
            Error::Server { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, SERVER_NOT_AVAILABLE);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_retries_means_a_single_request() {
        let (base, requests) = bad_gateway().await;
        let err = remote(&base).logout().await.unwrap_err();
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert_eq!(err.status(), Some(502));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_unavailable() {
        // nothing listens on port 9 of localhost
        let r = remote("http://127.0.0.1:9/");
        let err = r.logout().await.unwrap_err();
        assert!(matches!(err, Error::NetworkUnavailable { .. }));
        assert_eq!(err.status(), Some(500));
    }
}
