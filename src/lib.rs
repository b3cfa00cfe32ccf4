//! adslink: Google Ads API access layer.
//!
//! The core is three pieces: [`auth::CredentialManager`] (OAuth2
//! refresh-token exchange with an in-memory cache),
//! [`dispatch::Dispatcher`] (authenticated requests with a single
//! refresh-and-retry on token rejection), and [`query::QueryExecutor`]
//! (GAQL execution with pagination folded away). [`accounts`] is the
//! tool layer on top, [`config`] the environment surface.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod query;

pub use errors::{AdsError, Result};
