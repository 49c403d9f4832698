use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sepaqr::amount;
use sepaqr::api;
use sepaqr::cli::{self, GenerateArgs};
use sepaqr::config::Config;
use sepaqr::keys;
use sepaqr::state::AppState;

#[derive(Parser)]
#[command(
    name = "sepaqr",
    version,
    about = "SEPA Credit Transfer (EPC) QR code service"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate payloads or PNGs without running the server.
    Generate(GenerateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli_args = Cli::parse();
    if let Some(Command::Generate(args)) = cli_args.command {
        amount::set_lenient_ocr(lenient_from_env());
        return cli::run_generate(&args);
    }

    run_server().await
}

fn lenient_from_env() -> bool {
    matches!(
        std::env::var("AMOUNT_LENIENT_OCR")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

async fn run_server() -> anyhow::Result<()> {
    let cfg = Config::load().context("config load failed")?;
    amount::set_lenient_ocr(cfg.amount_lenient_ocr);

    info!("sepaqr version {}", cfg.version);

    let mut ready = true;
    let mut reason = String::new();
    let store = match keys::Store::load_from_file(&cfg.keys_file) {
        Ok(s) => s,
        Err(e) => {
            if cfg.require_keys {
                ready = false;
                reason = format!("keys load failed: {e}");
            }
            warn!("keys load failed, auth disabled: {e}");
            keys::Store::empty()
        }
    };
    if store.is_empty() {
        if cfg.require_keys {
            ready = false;
            if reason.is_empty() {
                reason = "no valid keys loaded".to_string();
            }
        }
        warn!("no valid keys loaded; auth mode disabled");
        if cfg.require_api_key {
            warn!("REQUIRE_API_KEY enabled but no valid keys loaded; all requests will be unauthorized");
            ready = false;
            if reason.is_empty() {
                reason = "REQUIRE_API_KEY enabled but no valid keys loaded".to_string();
            }
        }
    }

    if cfg.tls_enabled {
        // Certificate provisioning lives outside this process.
        warn!("TLS_ENABLED is set; terminate TLS in front of this service");
    }

    let state = AppState::new(cfg.clone(), store);
    state.set_readiness(ready, &reason);

    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.listen_ip, cfg.listen_port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("sepaqr listening on http://{addr}/sepa-qr");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server stopped")?;

    info!("shutdown complete");
    Ok(())
}

const SHUTDOWN_BUDGET: Duration = Duration::from_secs(8);

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("shutdown requested (ctrl-c)"),
        _ = terminate => info!("shutdown requested (SIGTERM)"),
    }

    // In-flight requests get a fixed drain budget after the signal.
    tokio::spawn(async {
        tokio::time::sleep(SHUTDOWN_BUDGET).await;
        warn!("graceful shutdown exceeded {SHUTDOWN_BUDGET:?}; exiting");
        std::process::exit(0);
    });
}
