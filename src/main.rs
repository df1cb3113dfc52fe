mod cli;
mod config;
mod errors;
mod feed;
mod identity;
mod session;
mod store;
mod sync;
mod thread;
mod utils;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    cli::run().await
}
