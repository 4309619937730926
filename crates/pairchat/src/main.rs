//! pairchat - two-party encrypted chat client
//!
//! Reads chat lines from stdin and prints the conversation on stdout.
//! Logs go to stderr.

use anyhow::Context;
use clap::Parser;
use pairchat::config::Config;
use pairchat::event::{print_events, ClientEvent};
use pairchat::session::{ClientSession, CloseReason};
use std::io::BufRead;
use std::process::ExitCode;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("pairchat=info".parse().unwrap()))
        .init();

    // Parse configuration
    let config = Config::parse();

    match run(config).await {
        Ok(CloseReason::Rejected(reason)) => {
            error!("Server refused the connection: {}", reason);
            ExitCode::FAILURE
        }
        Ok(reason) => {
            info!("Session closed: {:?}", reason);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<CloseReason> {
    let addr = config.addr();
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    info!("Connected to {}", addr);

    // Blocking stdin reads stay on their own thread so shutdown never
    // waits on the console.
    let (input_tx, input_rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if input_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let printer = tokio::spawn(async move {
        if let Err(e) = print_events(event_rx, std::io::stdout()).await {
            // Console is gone; the session keeps running without output.
            debug!("Stopping console output: {}", e);
        }
    });

    let reason = ClientSession::new(event_tx)
        .run(stream, input_rx)
        .await
        .context("chat session failed")?;

    printer.await.context("console printer failed")?;
    Ok(reason)
}
