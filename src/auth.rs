//! OAuth2 refresh-token flow with an in-memory token cache.
//!
//! One `CredentialManager` exists per process (single developer identity).
//! The cached access token and its expiry live behind one mutex that is held
//! across the whole check-refresh-store sequence, so concurrent callers that
//! find the token stale never race into duplicate exchanges: the first one
//! refreshes, the rest block on the lock and then read the fresh token.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::errors::{AdsError, Result};

/// Refresh this long before the provider-reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

pub struct CredentialManager {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

impl CredentialManager {
    pub fn new(cfg: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            token_url: cfg.token_url.clone(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            refresh_token: cfg.refresh_token.clone(),
            cached: Mutex::new(None),
        }
    }

    /// Return a currently-valid bearer token, exchanging the refresh token
    /// only when the cache is empty or within [`EXPIRY_MARGIN`] of expiry.
    pub async fn get_access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }
        self.refresh_locked(&mut cached).await
    }

    /// Unconditionally repeat the exchange, bypassing the cache. Used by the
    /// dispatcher after the ads API rejects a token the cache thought fresh.
    pub async fn force_refresh(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        self.refresh_locked(&mut cached).await
    }

    /// Perform the exchange and replace token + expiry together. The caller
    /// holds the cache lock, so no reader can observe a half-written pair.
    async fn refresh_locked(&self, cached: &mut Option<CachedToken>) -> Result<String> {
        tracing::debug!("exchanging refresh token for a new access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AdsError::Auth {
                status: None,
                body: format!("token endpoint unreachable: {e}"),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| AdsError::Auth {
            status: Some(status.as_u16()),
            body: format!("failed to read token response: {e}"),
        })?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "token exchange rejected");
            return Err(AdsError::Auth {
                status: Some(status.as_u16()),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| AdsError::Auth {
            status: Some(status.as_u16()),
            body: format!("malformed token response: {e} (body: {body})"),
        })?;

        let token = CachedToken {
            access_token: parsed.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        };
        tracing::info!(expires_in = parsed.expires_in, "access token refreshed");
        *cached = Some(token);

        Ok(parsed.access_token)
    }
}
