//! pairchatd - two-party encrypted chat relay
//!
//! Accepts two participants, announces them to each other, and relays
//! their key announcements and ciphertext.

use clap::Parser;
use pairchatd::config::Config;
use pairchatd::server::Server;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("pairchatd=info".parse().unwrap()))
        .init();

    // Parse configuration
    let config = Config::parse();

    info!("pairchatd v{}", env!("CARGO_PKG_VERSION"));

    let server = match Server::bind(config.addr()).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    ExitCode::SUCCESS
}
