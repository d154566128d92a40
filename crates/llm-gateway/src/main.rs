//! Entry point: argument parsing, logging setup, and controller handoff.

mod config;
mod controller;
mod frame;
mod mqtt;
mod worker;

use clap::Parser;
use config::Args;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if let Err(err) = controller::run(args).await {
        tracing::error!(%err, "gateway exited with error");
        std::process::exit(err.exit_code());
    }
}
