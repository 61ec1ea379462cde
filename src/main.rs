//! DocChat entry point.
//!
//! `docchat serve` (the default) runs the chat server; `docchat chat` talks
//! to a running server from the terminal.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;

use docchat::client::{HttpTransport, terminal};
use docchat::config::{AppConfig, Cli, Command};
use docchat::{server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    let config = match AppConfig::from_cli(&cli) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    telemetry::init_tracing(config.log.json);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::start_server(config).await,
        Command::Chat { .. } => {
            let base_url = &config.client.base_url;
            let transport = match config.client.request_timeout_secs {
                Some(secs) => HttpTransport::with_timeout(base_url, Duration::from_secs(secs))?,
                None => HttpTransport::new(base_url)?,
            };
            tracing::info!(
                name: "terminal.started",
                endpoint = %transport.endpoint(),
                ordering = ?config.client.ordering,
                "Chatting from the terminal; close stdin to exit"
            );
            terminal::run(transport, config.client.ordering).await
        }
    }
}
