use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info};

use tally_core::{config::Config, IpFilter, RateLimiter, ReferrerClassifier};
use tally_duckdb::DuckDbBackend;

use crate::pipeline::{geo::TimezoneTable, useragent::WootheeParser, EventPipeline};

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// Event store, analytics backend and website registry in one.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    pub ip_filter: Arc<IpFilter>,

    /// One limiter for all event traffic.
    pub rate_limiter: Arc<RateLimiter>,

    pub pipeline: Arc<EventPipeline>,
}

impl AppState {
    /// Wire the backend into the pipeline and configure admission from `config`.
    ///
    /// Fails only when an embedded preset does not parse.
    pub fn new(db: DuckDbBackend, config: Config) -> Result<Self> {
        let db = Arc::new(db);

        let ip_filter = IpFilter::with_presets();
        let manual = ip_filter.load_from_comma_separated(&config.blocked_ips);
        ip_filter.set_block_abusive_ips(config.block_abusive_ips);
        ip_filter.set_block_tor_exit_nodes(config.block_tor_exit_nodes);
        debug!(
            manual,
            abusive = config.block_abusive_ips,
            tor = config.block_tor_exit_nodes,
            "IP filter configured"
        );

        let rate_limiter = RateLimiter::new(config.rate_limit_requests, config.rate_limit_window());

        let pipeline = EventPipeline::new(
            db.clone(),
            db.clone(),
            ReferrerClassifier::with_presets()?,
            Arc::new(WootheeParser),
            Arc::new(TimezoneTable::with_presets()?),
        );

        Ok(Self {
            db,
            config: Arc::new(config),
            ip_filter: Arc::new(ip_filter),
            rate_limiter: Arc::new(rate_limiter),
            pipeline: Arc::new(pipeline),
        })
    }

    /// Background loop: drop expired rate-limit counters once per window.
    ///
    /// Spawned as a `tokio::spawn` task in `main.rs`. Expired counters would
    /// otherwise linger until LRU pressure pushed them out.
    pub async fn run_rate_limit_purge_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.rate_limiter.window());
        loop {
            ticker.tick().await;
            let purged = self.rate_limiter.purge_expired(Instant::now());
            if purged > 0 {
                info!(purged, "Purged expired rate-limit counters");
            }
        }
    }
}
