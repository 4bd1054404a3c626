use std::sync::Arc;

use clap::Parser;
use rateprof_core::{PineconeIndex, RagConfig};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use rateprof_server::http;
use rateprof_server::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "rateprof.toml")]
    config: String,

    /// Check configuration and upstream reachability, then exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match RagConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    if args.health {
        match PineconeIndex::new(&config.vector_index, &config.retry) {
            Ok(index) => match index.host().await {
                Ok(host) => println!("✅ Vector index {} reachable at {}", config.vector_index.index, host),
                Err(e) => {
                    println!("❌ Vector index lookup failed: {}", e);
                    std::process::exit(1);
                }
            },
            Err(e) => {
                println!("❌ Vector index client: {}", e);
                std::process::exit(1);
            }
        }

        match AppState::from_config(config.clone()) {
            Ok(state) => println!("✅ Completion model: {}", state.completion.model()),
            Err(e) => {
                println!("❌ Client setup failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Rateprof health check passed");
        return Ok(());
    }

    let state = match AppState::from_config(config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to initialise upstream clients: {}", e);
            std::process::exit(1);
        }
    };

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
