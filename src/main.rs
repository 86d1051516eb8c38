//! Status-page backend for a Komari monitoring server.
//!
//! Run with
//!
//! ```not_rust
//! KOMARI_BASE_URL=https://komari.example.com cargo run -- serve
//! cargo run -- watch --url http://127.0.0.1:3000/api/servers
//! ```

use server_status::config::{self, Bootstrap};
use server_status::core::{Logger, Poller};
use server_status::handler::{self, api::AppState};

use clap::{Parser, Subcommand};
use std::{process::ExitCode, sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "server-status", version, about = "Komari status page backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP proxy (default)
    Serve {
        /// Listen address, overrides LISTEN_ADDR and the config file
        #[arg(long)]
        addr: Option<String>,
    },
    /// Poll a `/api/servers` endpoint and print a text dashboard
    Watch {
        #[arg(
            long,
            env = "SERVER_STATUS_URL",
            default_value = "http://127.0.0.1:3000/api/servers"
        )]
        url: String,
        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval: u64,
        /// Only show one region
        #[arg(long)]
        region: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server_status=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Serve { addr: None }) {
        Command::Serve { addr } => run_serve(addr).await,
        Command::Watch {
            url,
            interval,
            region,
        } => run_watch(url, interval, region).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_serve(addr: Option<String>) -> Result<(), axum::BoxError> {
    // 初始化配置
    let mut conf: Bootstrap = config::load_bootstrap_config()?;
    if let Some(addr) = addr {
        conf.server.addr = addr;
    }
    let addr = conf.socket_addr()?;
    match &conf.komari.base_url {
        Some(url) => tracing::info!("upstream {} ({:?})", url, conf.komari.mode),
        None if conf.legacy_backend_url.is_some() => {
            tracing::info!("no KOMARI_BASE_URL, passing /api/servers through BACKEND_API_URL")
        }
        None => tracing::warn!("no upstream configured, data routes will fail"),
    }

    let http = reqwest::Client::new();
    let state = Arc::new(AppState::new(conf, http));
    handler::listen(state, addr).await
}

async fn run_watch(
    url: String,
    interval: u64,
    region: Option<String>,
) -> Result<(), axum::BoxError> {
    let http = reqwest::Client::new();
    let poller = Poller::new(http, url, Duration::from_secs(interval.max(1)));
    let (tx, mut rx) = mpsc::channel(8);
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(poller.run(tx, shutdown));

    let mut logger = Logger::new(std::io::stdout(), chrono::Local, region);
    loop {
        tokio::select! {
            Some(event) = rx.recv() => logger.log(event)?,
            _ = tokio::signal::ctrl_c() => break,
            else => break,
        }
    }
    let _ = stop.send(true);
    task.await?;
    Ok(())
}
