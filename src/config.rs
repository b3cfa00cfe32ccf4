use url::Url;

use crate::errors::{AdsError, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://googleads.googleapis.com";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_API_VERSION: &str = "v20";

/// Process-wide configuration. The four credentials are required; the URL
/// and version fields exist so tests and version pins can redirect the
/// client without touching credential handling.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub developer_token: String,
    pub api_base_url: String,
    pub token_url: String,
    pub api_version: String,
}

impl Config {
    /// Load from the process environment. `.env` is honoured if present.
    pub fn load() -> Result<Config> {
        dotenvy::dotenv().ok();
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load through an injected lookup so validation is testable without
    /// mutating the process environment.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(AdsError::Config(format!(
                    "{key} is not set; set it in the environment or .env before starting"
                ))),
            }
        };

        let valid_url = |key: &str, value: String| -> Result<String> {
            Url::parse(&value)
                .map_err(|e| AdsError::Config(format!("{key} is not a valid URL ({e}): {value}")))?;
            Ok(value)
        };

        Ok(Config {
            client_id: required("GOOGLE_ADS_CLIENT_ID")?,
            client_secret: required("GOOGLE_ADS_CLIENT_SECRET")?,
            refresh_token: required("GOOGLE_ADS_REFRESH_TOKEN")?,
            developer_token: required("GOOGLE_ADS_DEVELOPER_TOKEN")?,
            api_base_url: valid_url(
                "GOOGLE_ADS_API_BASE_URL",
                lookup("GOOGLE_ADS_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.into()),
            )?,
            token_url: valid_url(
                "GOOGLE_ADS_TOKEN_URL",
                lookup("GOOGLE_ADS_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into()),
            )?,
            api_version: lookup("GOOGLE_ADS_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.into()),
        })
    }
}
