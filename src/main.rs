use std::sync::Arc;

use clap::Parser;

use adslink::accounts::{format_customer_id, AccountDirectory};
use adslink::auth::CredentialManager;
use adslink::config::Config;
use adslink::dispatch::Dispatcher;
use adslink::query::QueryExecutor;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "adslink=info".into()),
        ))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();

    // Fail fast on missing credentials, before any command runs.
    let cfg = Config::load()?;
    let credentials = Arc::new(CredentialManager::new(&cfg));
    let dispatcher = Arc::new(Dispatcher::new(&cfg, credentials));
    let query = Arc::new(QueryExecutor::new(&cfg, dispatcher.clone()));

    match args.command {
        cli::Commands::Gaql {
            customer_id,
            query: gaql,
            manager_id,
        } => {
            let cid = format_customer_id(&customer_id)?;
            let mgr = manager_id
                .map(|m| format_customer_id(&m))
                .transpose()?;
            let result = query.execute(&cid, &gaql, mgr).await?;
            tracing::info!(rows = result.total_rows, "query finished");
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "results": result.results,
                    "totalRows": result.total_rows,
                }))?
            );
        }
        cli::Commands::Accounts => {
            let directory = AccountDirectory::new(&cfg, dispatcher, query);
            let listing = directory.list_accounts().await?;
            tracing::info!(total = listing.total_accounts, "account listing finished");
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
    }

    Ok(())
}
