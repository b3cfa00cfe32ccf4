use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AdsError>;

#[derive(Debug, Error)]
pub enum AdsError {
    /// Required configuration is missing or unusable. Raised before any
    /// network call is attempted.
    #[error("configuration error: {0}")]
    Config(String),

    /// The OAuth token exchange failed: bad refresh token, revoked grant,
    /// or the identity provider was unreachable. `status` is `None` when the
    /// provider was never reached.
    #[error("token exchange failed ({status:?}): {body}")]
    Auth { status: Option<u16>, body: String },

    /// The ads API returned a non-success status after authentication.
    /// Status and body are preserved verbatim; interpreting business-level
    /// error codes is the caller's job.
    #[error("ads API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Network/transport failure reaching the ads API itself. Never retried.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A customer id that is not ten digits after normalization.
    #[error("invalid customer id: {0:?}")]
    InvalidCustomerId(String),
}

impl AdsError {
    /// True when the upstream is saying the bearer token is no longer
    /// accepted. Drives the dispatcher's single forced-refresh retry.
    pub fn is_auth_rejection(status: u16, body: &str) -> bool {
        status == 401 || body.contains("UNAUTHENTICATED")
    }
}
