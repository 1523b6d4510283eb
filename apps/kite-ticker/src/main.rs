//! Kite Ticker Binary
//!
//! Streams ticks for a configured set of instruments and logs them.
//!
//! # Usage
//!
//! ```bash
//! KITE_TICKER_TOKENS=408065,884737 KITE_TICKER_MODE=full cargo run --bin kite-ticker
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `KITE_API_KEY`: Kite Connect API key
//! - `KITE_ACCESS_TOKEN`: Access token from the login flow
//!
//! ## Optional
//! - `KITE_TICKER_ROOT`: Socket root URL (default: wss://ws.kite.trade/)
//! - `KITE_TICKER_RECONNECT`: Auto-reconnect (default: true)
//! - `KITE_TICKER_RECONNECT_INTERVAL_SECS`: Base interval, at least 5 (default: 5)
//! - `KITE_TICKER_RECONNECT_TRIES`: Maximum attempts (default: 50)
//! - `KITE_TICKER_TOKENS`: Comma-separated instrument tokens
//! - `KITE_TICKER_MODE`: ltp | quote | full (default: quote)
//! - `KITE_TICKER_METRICS_PORT`: Prometheus port, 0 disables (default: 0)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: kite-ticker)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;

use anyhow::Context;
use kite_ticker::infrastructure::telemetry;
use kite_ticker::{Ticker, TickerSettings, serve_metrics};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting Kite ticker");

    let settings = TickerSettings::from_env()?;
    log_settings(&settings);

    if settings.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], settings.metrics_port));
        serve_metrics(addr).context("failed to start metrics exporter")?;
        tracing::info!(%addr, "Metrics exporter listening");
    }

    let ticker = Ticker::new(settings.ticker_config(), settings.credentials.clone());
    register_handlers(&ticker);

    let subscription = &settings.subscription;
    ticker.subscribe(&subscription.tokens);
    ticker.set_mode(&subscription.tokens, subscription.mode);

    if let Err(e) = ticker.connect().await {
        // Auto-reconnect keeps retrying in the background.
        if !settings.reconnect.enabled {
            return Err(e).context("failed to connect to Kite ticker");
        }
        tracing::warn!(error = %e, "Initial connect failed, waiting for reconnect");
    }

    await_shutdown().await;

    ticker.close();
    // Let the driver finish the close handshake.
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    tracing::info!("Kite ticker stopped");

    Ok(())
}

fn register_handlers(ticker: &Ticker) {
    ticker.on_connect(|| tracing::info!("Ticker connected"));
    ticker.on_close(|| tracing::info!("Ticker closed"));
    ticker.on_error(|message| tracing::error!(%message, "Ticker error"));
    ticker.on_reconnect(|attempt| tracing::warn!(attempt, "Ticker reconnecting"));
    ticker.on_no_reconnect(|| tracing::error!("Ticker gave up reconnecting"));
    ticker.on_order_update(|order| {
        tracing::info!(
            order_id = %order.order_id,
            status = %order.status,
            symbol = %order.tradingsymbol,
            filled = order.filled_quantity,
            "Order update"
        );
    });
    ticker.on_tick(|tick| {
        tracing::info!(
            token = tick.instrument_token,
            mode = %tick.mode,
            last_price = %tick.last_price,
            volume = tick.volume,
            "Tick"
        );
    });
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed settings.
fn log_settings(settings: &TickerSettings) {
    tracing::info!(
        root = %settings.root,
        reconnect = settings.reconnect.enabled,
        reconnect_interval_secs = settings.reconnect.interval.as_secs(),
        reconnect_tries = settings.reconnect.max_retries,
        tokens = settings.subscription.tokens.len(),
        mode = %settings.subscription.mode,
        metrics_port = settings.metrics_port,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
