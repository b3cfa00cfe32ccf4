//! Account directory: the one tool-layer module kept in-tree.
//!
//! Listing accounts fans out one lookup per accessible customer, bounded so
//! a large MCC tree cannot stampede the API. Per-account lookup failures
//! degrade to a placeholder name; only the top-level listing call aborts.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::dispatch::{Dispatcher, InvocationContext};
use crate::errors::{AdsError, Result};
use crate::query::QueryExecutor;

/// Concurrent top-level info lookups.
const INFO_FANOUT: usize = 10;
/// Concurrent sub-account listings per manager.
const SUB_ACCOUNT_FANOUT: usize = 5;

const CUSTOMER_INFO_QUERY: &str =
    "SELECT customer.descriptive_name, customer.manager FROM customer";
const SUB_ACCOUNTS_QUERY: &str = "SELECT customer_client.id, \
     customer_client.descriptive_name, customer_client.level, \
     customer_client.manager FROM customer_client WHERE customer_client.level > 0";

const NAME_UNAVAILABLE: &str = "Name not available";

/// Normalize a customer id to the ten-digit form the API expects.
/// Accepts `123-456-7890`, `1234567890`, quoted and padded variants.
pub fn format_customer_id(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | '"' | '\''))
        .collect();
    if cleaned.is_empty() || cleaned.len() > 10 || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(AdsError::InvalidCustomerId(raw.to_string()));
    }
    Ok(format!("{cleaned:0>10}"))
}

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub access_type: String,
    pub is_manager: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub level: u64,
}

#[derive(Debug, Serialize)]
pub struct AccountList {
    pub accounts: Vec<Account>,
    pub total_accounts: usize,
}

pub struct AccountDirectory {
    dispatcher: Arc<Dispatcher>,
    query: Arc<QueryExecutor>,
    base_url: String,
    api_version: String,
}

impl AccountDirectory {
    pub fn new(cfg: &Config, dispatcher: Arc<Dispatcher>, query: Arc<QueryExecutor>) -> Self {
        Self {
            dispatcher,
            query,
            base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            api_version: cfg.api_version.clone(),
        }
    }

    /// List every accessible account, resolving names and nested
    /// sub-accounts with bounded parallelism. Deduplicates by id.
    pub async fn list_accounts(&self) -> Result<AccountList> {
        let url = format!(
            "{}/{}/customers:listAccessibleCustomers",
            self.base_url, self.api_version
        );
        let listing = self
            .dispatcher
            .dispatch(&InvocationContext::get("", url))
            .await?;

        let resource_names: Vec<String> = listing
            .get("resourceNames")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|rn| rn.rsplit('/').next())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        if resource_names.is_empty() {
            return Ok(AccountList {
                accounts: Vec::new(),
                total_accounts: 0,
            });
        }
        tracing::info!(
            count = resource_names.len(),
            "resolving top-level account details"
        );

        let mut accounts: Vec<Account> = stream::iter(resource_names)
            .map(|raw| async move {
                let id = format_customer_id(&raw)?;
                let (name, is_manager) = self.customer_info(&id).await;
                Ok::<Account, AdsError>(Account {
                    id,
                    name,
                    access_type: "direct".into(),
                    is_manager,
                    parent_id: None,
                    level: 0,
                })
            })
            .buffer_unordered(INFO_FANOUT)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let mut seen: HashSet<String> = accounts.iter().map(|a| a.id.clone()).collect();

        let manager_ids: Vec<String> = accounts
            .iter()
            .filter(|a| a.is_manager)
            .map(|a| a.id.clone())
            .collect();
        let nested: Vec<Vec<Account>> = stream::iter(manager_ids)
            .map(|mid| async move { self.sub_accounts(&mid).await })
            .buffer_unordered(SUB_ACCOUNT_FANOUT)
            .collect()
            .await;

        for sub in nested.into_iter().flatten() {
            if seen.insert(sub.id.clone()) {
                accounts.push(sub);
            }
        }

        let total_accounts = accounts.len();
        Ok(AccountList {
            accounts,
            total_accounts,
        })
    }

    /// Name and manager flag for one customer. Lookup failures degrade to a
    /// placeholder so one bad account cannot fail the whole listing.
    async fn customer_info(&self, customer_id: &str) -> (String, bool) {
        match self.query.execute(customer_id, CUSTOMER_INFO_QUERY, None).await {
            Ok(result) => {
                let customer = result
                    .results
                    .first()
                    .and_then(|row| row.get("customer"))
                    .cloned()
                    .unwrap_or_default();
                let name = customer
                    .get("descriptiveName")
                    .and_then(Value::as_str)
                    .unwrap_or(NAME_UNAVAILABLE)
                    .to_string();
                let is_manager = customer
                    .get("manager")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                (name, is_manager)
            }
            Err(e) => {
                tracing::warn!(customer_id, error = %e, "customer info lookup failed");
                (NAME_UNAVAILABLE.into(), false)
            }
        }
    }

    /// Managed accounts under one manager. Failures yield an empty list.
    async fn sub_accounts(&self, manager_id: &str) -> Vec<Account> {
        let result = match self.query.execute(manager_id, SUB_ACCOUNTS_QUERY, None).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(manager_id, error = %e, "sub-account listing failed");
                return Vec::new();
            }
        };

        result
            .results
            .iter()
            .filter_map(|row| row.get("customerClient"))
            .filter_map(|client| {
                let raw_id = client.get("id").and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })?;
                let id = format_customer_id(&raw_id).ok()?;
                // level arrives as a JSON string in the REST representation
                let level = client
                    .get("level")
                    .map(|v| match v {
                        Value::String(s) => s.parse().unwrap_or(0),
                        Value::Number(n) => n.as_u64().unwrap_or(0),
                        _ => 0,
                    })
                    .unwrap_or(0);
                Some(Account {
                    name: client
                        .get("descriptiveName")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .unwrap_or_else(|| format!("Sub-account {id}")),
                    id,
                    access_type: "managed".into(),
                    is_manager: client
                        .get("manager")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    parent_id: Some(manager_id.to_string()),
                    level,
                })
            })
            .collect()
    }
}
