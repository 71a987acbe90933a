use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use tally_server::state::AppState;

/// `tally health`: liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$TALLY_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("TALLY_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("tally=info".parse()?),
        )
        .json()
        .init();

    let cfg = tally_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/tally.db", cfg.data_dir);
    let db = tally_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    // ON CONFLICT keeps this safe on every startup.
    for hostname in &cfg.websites {
        let hostname = hostname.to_ascii_lowercase();
        match db.seed_website(&hostname, &hostname).await {
            Ok(()) => info!(hostname = %hostname, "Website registered"),
            Err(e) => tracing::warn!(hostname = %hostname, error = %e, "Failed to register website"),
        }
    }

    let state = Arc::new(AppState::new(db, cfg.clone())?);

    if cfg.rate_limit_disable {
        info!("Rate limiting disabled (TALLY_RATE_LIMIT_DISABLE)");
    } else {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            state.run_rate_limit_purge_loop().await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = tally_server::app::build_app(Arc::clone(&state));

    info!(
        port = cfg.port,
        websites = cfg.websites.len(),
        "Tally listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;

    info!("Shut down cleanly");
    Ok(())
}
