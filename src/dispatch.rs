//! Uniform request dispatch for the ads API.
//!
//! Every call funnels through [`Dispatcher::dispatch`]: build the auth
//! headers, send, and, only when the upstream rejects the bearer token,
//! force one credential refresh and resend. Nothing else is ever retried at
//! this layer; a 500 or a malformed query surfaces immediately with its
//! status and body intact.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::auth::CredentialManager;
use crate::config::Config;
use crate::errors::{AdsError, Result};

const DEVELOPER_TOKEN_HEADER: &str = "developer-token";
const LOGIN_CUSTOMER_ID_HEADER: &str = "login-customer-id";

/// One authenticated call against the ads API. Immutable; consumed once.
///
/// `customer_id` must already be normalized to ten digits (see
/// [`crate::accounts::format_customer_id`]); the dispatcher does not check.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub customer_id: String,
    pub manager_id: Option<String>,
    pub url: String,
    pub method: Method,
    pub body: Option<Value>,
}

impl InvocationContext {
    pub fn get(customer_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            manager_id: None,
            url: url.into(),
            method: Method::GET,
            body: None,
        }
    }

    pub fn post(customer_id: impl Into<String>, url: impl Into<String>, body: Value) -> Self {
        Self {
            customer_id: customer_id.into(),
            manager_id: None,
            url: url.into(),
            method: Method::POST,
            body: Some(body),
        }
    }

    /// Attach the manager (login-customer-id) context, if any.
    pub fn with_manager(mut self, manager_id: Option<String>) -> Self {
        self.manager_id = manager_id.filter(|m| !m.is_empty());
        self
    }
}

pub struct Dispatcher {
    http: reqwest::Client,
    credentials: Arc<CredentialManager>,
    developer_token: String,
}

impl Dispatcher {
    pub fn new(cfg: &Config, credentials: Arc<CredentialManager>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(32)
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            credentials,
            developer_token: cfg.developer_token.clone(),
        }
    }

    /// Execute one authenticated request, with at most one automatic
    /// refresh-and-resend when the upstream rejects the token. Returns the
    /// parsed JSON body on success.
    pub async fn dispatch(&self, ctx: &InvocationContext) -> Result<Value> {
        let token = self.credentials.get_access_token().await?;
        let (mut status, mut body) = self.attempt(ctx, &token).await?;

        if !status.is_success() && AdsError::is_auth_rejection(status.as_u16(), &body) {
            tracing::warn!(
                status = status.as_u16(),
                customer_id = %ctx.customer_id,
                "access token rejected by ads API; refreshing and retrying once"
            );
            let token = self.credentials.force_refresh().await?;
            (status, body) = self.attempt(ctx, &token).await?;
        }

        if !status.is_success() {
            return Err(AdsError::Api {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&body).map_err(|e| AdsError::Api {
            status: status.as_u16(),
            body: format!("response was not valid JSON: {e} (body: {body})"),
        })
    }

    async fn attempt(&self, ctx: &InvocationContext, token: &str) -> Result<(StatusCode, String)> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| AdsError::Config("access token contains invalid bytes".into()))?,
        );
        headers.insert(
            DEVELOPER_TOKEN_HEADER,
            HeaderValue::from_str(&self.developer_token)
                .map_err(|_| AdsError::Config("developer token contains invalid bytes".into()))?,
        );
        if let Some(manager_id) = &ctx.manager_id {
            headers.insert(
                LOGIN_CUSTOMER_ID_HEADER,
                HeaderValue::from_str(manager_id)
                    .map_err(|_| AdsError::InvalidCustomerId(manager_id.clone()))?,
            );
        }

        let mut req = self
            .http
            .request(ctx.method.clone(), &ctx.url)
            .headers(headers);
        if let Some(body) = &ctx.body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base: &str) -> Config {
        Config {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            refresh_token: "rtok".into(),
            developer_token: "dtok".into(),
            api_base_url: base.into(),
            token_url: format!("{base}/token"),
            api_version: "v20".into(),
        }
    }

    async fn mount_token_endpoint(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"access_token":"tok-1","expires_in":3600}"#),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn build(server: &MockServer) -> Dispatcher {
        let cfg = test_config(&server.uri());
        let creds = Arc::new(CredentialManager::new(&cfg));
        Dispatcher::new(&cfg, creds)
    }

    #[tokio::test]
    async fn get_carries_bearer_and_developer_token_headers() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v20/customers/1234567890/campaigns"))
            .and(header("authorization", "Bearer tok-1"))
            .and(header("developer-token", "dtok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let d = build(&server);
        let ctx = InvocationContext::get(
            "1234567890",
            format!("{}/v20/customers/1234567890/campaigns", server.uri()),
        );
        let resp = d.dispatch(&ctx).await.unwrap();
        assert_eq!(resp["ok"], true);
    }

    #[tokio::test]
    async fn manager_context_adds_login_customer_id_header() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v20/customers/1234567890/googleAds:search"))
            .and(header("login-customer-id", "9998887777"))
            .and(body_json(json!({"query": "SELECT customer.id FROM customer"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;

        let d = build(&server);
        let ctx = InvocationContext::post(
            "1234567890",
            format!("{}/v20/customers/1234567890/googleAds:search", server.uri()),
            json!({"query": "SELECT customer.id FROM customer"}),
        )
        .with_manager(Some("9998887777".into()));
        d.dispatch(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn no_manager_context_means_no_login_customer_id_header() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v20/customers/1234567890/campaigns"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let d = build(&server);
        let ctx = InvocationContext::get(
            "1234567890",
            format!("{}/v20/customers/1234567890/campaigns", server.uri()),
        )
        .with_manager(None);
        d.dispatch(&ctx).await.unwrap();

        let api_requests: Vec<_> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path() != "/token")
            .collect();
        assert_eq!(api_requests.len(), 1);
        assert!(!api_requests[0].headers.contains_key("login-customer-id"));
    }

    #[tokio::test]
    async fn auth_rejection_is_retried_once_after_forced_refresh() {
        let server = MockServer::start().await;
        // Initial get + forced refresh.
        mount_token_endpoint(&server, 2).await;

        Mock::given(method("GET"))
            .and(path("/v20/customers/1234567890/campaigns"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string(r#"{"error":{"status":"UNAUTHENTICATED"}}"#),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v20/customers/1234567890/campaigns"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"recovered": true})))
            .expect(1)
            .mount(&server)
            .await;

        let d = build(&server);
        let ctx = InvocationContext::get(
            "1234567890",
            format!("{}/v20/customers/1234567890/campaigns", server.uri()),
        );
        let resp = d.dispatch(&ctx).await.unwrap();
        assert_eq!(resp["recovered"], true);
    }

    #[tokio::test]
    async fn persistent_401_fails_after_exactly_two_attempts() {
        let server = MockServer::start().await;
        // One initial token get plus one forced refresh, never a third.
        mount_token_endpoint(&server, 2).await;

        Mock::given(method("GET"))
            .and(path("/v20/customers/1234567890/campaigns"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .expect(2)
            .mount(&server)
            .await;

        let d = build(&server);
        let ctx = InvocationContext::get(
            "1234567890",
            format!("{}/v20/customers/1234567890/campaigns", server.uri()),
        );
        match d.dispatch(&ctx).await.unwrap_err() {
            AdsError::Api { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "token expired");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_surfaced_without_retry_or_refresh() {
        let server = MockServer::start().await;
        // Only the initial token fetch; a 500 must not force a refresh.
        mount_token_endpoint(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/v20/customers/1234567890/googleAds:search"))
            .respond_with(
                ResponseTemplate::new(500).set_body_string(r#"{"error":"internal error"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let d = build(&server);
        let ctx = InvocationContext::post(
            "1234567890",
            format!("{}/v20/customers/1234567890/googleAds:search", server.uri()),
            json!({"query": "SELECT bogus FROM nowhere"}),
        );
        match d.dispatch(&ctx).await.unwrap_err() {
            AdsError::Api { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("internal error"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_query_rejection_keeps_the_upstream_body_verbatim() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;

        let rejection = r#"{"error":{"code":400,"message":"Unrecognized field in the query: 'bogus.field'","status":"INVALID_ARGUMENT"}}"#;
        Mock::given(method("POST"))
            .and(path("/v20/customers/1234567890/googleAds:search"))
            .respond_with(ResponseTemplate::new(400).set_body_string(rejection))
            .expect(1)
            .mount(&server)
            .await;

        let d = build(&server);
        let ctx = InvocationContext::post(
            "1234567890",
            format!("{}/v20/customers/1234567890/googleAds:search", server.uri()),
            json!({"query": "SELECT bogus.field FROM campaign"}),
        );
        match d.dispatch(&ctx).await.unwrap_err() {
            AdsError::Api { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, rejection);
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
