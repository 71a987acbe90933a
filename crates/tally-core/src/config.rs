use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    /// DuckDB size string such as `"1GB"`; validated again when the backend opens.
    pub duckdb_memory_limit: String,
    pub cors_origins: Vec<String>,
    /// Hostnames registered at startup.
    pub websites: Vec<String>,
    /// Raw comma-separated list handed to `IpFilter::load_from_comma_separated`.
    pub blocked_ips: String,
    pub block_abusive_ips: bool,
    pub block_tor_exit_nodes: bool,
    pub rate_limit_requests: i64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_disable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: "./data".to_string(),
            duckdb_memory_limit: "1GB".to_string(),
            cors_origins: Vec::new(),
            websites: Vec::new(),
            blocked_ips: String::new(),
            block_abusive_ips: false,
            block_tor_exit_nodes: false,
            rate_limit_requests: 100,
            rate_limit_window_secs: 60,
            rate_limit_disable: false,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            port: std::env::var("TALLY_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("TALLY_DATA_DIR").unwrap_or(defaults.data_dir),
            duckdb_memory_limit: std::env::var("TALLY_DUCKDB_MEMORY")
                .unwrap_or(defaults.duckdb_memory_limit),
            cors_origins: env_list("TALLY_CORS_ORIGINS"),
            websites: env_list("TALLY_WEBSITES"),
            blocked_ips: std::env::var("TALLY_BLOCKED_IPS").unwrap_or_default(),
            block_abusive_ips: env_flag("TALLY_BLOCK_ABUSIVE_IPS", false),
            block_tor_exit_nodes: env_flag("TALLY_BLOCK_TOR_EXIT_NODES", false),
            rate_limit_requests: std::env::var("TALLY_RATE_LIMIT_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &i64| *v > 0)
                .unwrap_or(defaults.rate_limit_requests),
            rate_limit_window_secs: std::env::var("TALLY_RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .unwrap_or(defaults.rate_limit_window_secs),
            rate_limit_disable: env_flag("TALLY_RATE_LIMIT_DISABLE", false),
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}
