//! GAQL execution with pagination folded away.
//!
//! The search endpoint returns results one page at a time with a
//! continuation token; callers here get the whole result set in page order.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::Config;
use crate::dispatch::{Dispatcher, InvocationContext};
use crate::errors::Result;

/// Complete result set for one GAQL query.
///
/// `total_rows` is always `results.len()`: the count is computed from the
/// rows actually returned, never taken from the upstream's total hint, so it
/// can never disagree with the accumulated result set.
#[derive(Debug)]
pub struct QueryResult {
    pub results: Vec<Value>,
    pub total_rows: u64,
}

pub struct QueryExecutor {
    dispatcher: Arc<Dispatcher>,
    base_url: String,
    api_version: String,
}

impl QueryExecutor {
    pub fn new(cfg: &Config, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            api_version: cfg.api_version.clone(),
        }
    }

    fn search_url(&self, customer_id: &str) -> String {
        format!(
            "{}/{}/customers/{}/googleAds:search",
            self.base_url, self.api_version, customer_id
        )
    }

    /// Run `query` against `customer_id`, following continuation tokens
    /// until exhausted. Any failure on any page aborts the whole call;
    /// already-fetched pages are discarded.
    pub async fn execute(
        &self,
        customer_id: &str,
        query: &str,
        manager_id: Option<String>,
    ) -> Result<QueryResult> {
        let url = self.search_url(customer_id);
        let mut results: Vec<Value> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut body = json!({ "query": query });
            if let Some(token) = &page_token {
                body["pageToken"] = json!(token);
            }

            let ctx = InvocationContext::post(customer_id, &url, body)
                .with_manager(manager_id.clone());
            let page = self.dispatcher.dispatch(&ctx).await?;
            pages += 1;

            if let Some(rows) = page.get("results").and_then(Value::as_array) {
                results.extend(rows.iter().cloned());
            }

            match page.get("nextPageToken").and_then(Value::as_str) {
                Some(token) if !token.is_empty() => page_token = Some(token.to_string()),
                _ => break,
            }
        }

        tracing::debug!(
            customer_id,
            pages,
            rows = results.len(),
            "GAQL query complete"
        );

        let total_rows = results.len() as u64;
        Ok(QueryResult {
            results,
            total_rows,
        })
    }
}
