use clap::{Parser, Subcommand};

/// adslink: Google Ads API access layer
#[derive(Parser)]
#[command(name = "adslink", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a GAQL query and print the full result set as JSON
    Gaql {
        /// Target customer ID (dashes allowed, e.g. 123-456-7890)
        #[arg(long)]
        customer_id: String,
        /// GAQL query text
        #[arg(long)]
        query: String,
        /// Manager (login-customer-id) when acting on a managed account
        #[arg(long)]
        manager_id: Option<String>,
    },

    /// List all accessible accounts including nested sub-accounts
    Accounts,
}
