//! Runtime engine settings.
//!
//! `SET` does not accept bound parameters, so these are the only statements
//! built by interpolation. Inputs are checked against an allow-list first.

use std::sync::OnceLock;

use duckdb::Connection;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DuckDbBackend;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid memory limit format: {0}")]
    InvalidMemoryLimit(String),

    #[error("thread count must be positive, got {0}")]
    InvalidThreads(i64),

    #[error(transparent)]
    Database(#[from] duckdb::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuckDbSettings {
    pub threads: i64,
    pub memory_limit: String,
}

#[allow(clippy::expect_used)]
fn memory_limit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d+(?:\.\d+)?(?:MB|GB|TB|MiB|GiB|TiB)$").expect("static pattern compiles")
    })
}

/// Accept only a number followed by one of MB, GB, TB, MiB, GiB, TiB.
pub fn validate_memory_limit(limit: &str) -> Result<&str, SettingsError> {
    if memory_limit_pattern().is_match(limit) {
        Ok(limit)
    } else {
        Err(SettingsError::InvalidMemoryLimit(limit.to_string()))
    }
}

pub(crate) fn apply_memory_limit(conn: &Connection, limit: &str) -> Result<(), SettingsError> {
    let limit = validate_memory_limit(limit)?;
    conn.execute_batch(&format!("SET memory_limit = '{limit}'"))?;
    Ok(())
}

pub(crate) fn apply_threads(conn: &Connection, threads: i64) -> Result<(), SettingsError> {
    if threads <= 0 {
        return Err(SettingsError::InvalidThreads(threads));
    }
    conn.execute_batch(&format!("SET threads = {threads}"))?;
    Ok(())
}

impl DuckDbBackend {
    pub async fn get_settings(&self) -> anyhow::Result<DuckDbSettings> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT value FROM duckdb_settings() WHERE name = ?1")?;
        let threads: String = stmt.query_row(duckdb::params!["threads"], |row| row.get(0))?;
        let memory_limit: String =
            stmt.query_row(duckdb::params!["memory_limit"], |row| row.get(0))?;
        Ok(DuckDbSettings {
            threads: threads.trim().parse()?,
            memory_limit,
        })
    }

    pub async fn set_memory_limit(&self, limit: &str) -> Result<(), SettingsError> {
        let conn = self.conn.lock().await;
        apply_memory_limit(&conn, limit)?;
        tracing::info!(memory_limit = limit, "DuckDB memory limit updated");
        Ok(())
    }

    pub async fn set_threads(&self, threads: i64) -> Result<(), SettingsError> {
        let conn = self.conn.lock().await;
        apply_threads(&conn, threads)?;
        tracing::info!(threads, "DuckDB thread count updated");
        Ok(())
    }
}
