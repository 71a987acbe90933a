use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use tally_core::event::{CustomEventHit, PageViewDuration, PageViewHit};
use tally_core::store::EventStore;

use crate::schema::SCHEMA_SQL;
use crate::settings::{apply_memory_limit, apply_threads};
use crate::sql::args::sql_timestamp;

const DEFAULT_THREADS: i64 = 2;

/// A DuckDB backend for tally.
///
/// DuckDB is single-writer, so the connection sits behind `Arc<Mutex<_>>`:
/// handlers share one backend and every statement runs under the lock.
///
/// The memory limit comes from `Config.duckdb_memory_limit` and must pass
/// [`crate::settings::validate_memory_limit`] before the database opens.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`, apply engine
    /// settings and create the schema.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn, memory_limit)?;
        info!(
            path,
            memory_limit,
            threads = DEFAULT_THREADS,
            "DuckDB opened"
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Data is discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn, "1GB")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection, memory_limit: &str) -> Result<()> {
        apply_memory_limit(conn, memory_limit)?;
        apply_threads(conn, DEFAULT_THREADS)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Execute `SELECT 1` as a lightweight liveness check for `/health`.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

fn insert_custom_events(tx: &duckdb::Transaction<'_>, events: &[CustomEventHit]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO events (batch_id, bid, group_name, name, value, date_created) \
         VALUES (?1, ?2, ?3, ?4, ?5, CAST(?6 AS TIMESTAMP))",
    )?;
    for event in events {
        stmt.execute(duckdb::params![
            event.batch_id,
            event.bid,
            event.group_name,
            event.name,
            event.value,
            sql_timestamp(&event.date_created),
        ])?;
    }
    Ok(())
}

#[async_trait]
impl EventStore for DuckDbBackend {
    /// Insert the view and its properties in a single transaction.
    async fn append_page_view(
        &self,
        view: &PageViewHit,
        properties: &[CustomEventHit],
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO views (
                bid, hostname, pathname, is_unique_user, is_unique_page,
                referrer_host, referrer_group, country, language_base, language_dialect,
                ua_browser, ua_os, ua_device_type,
                utm_source, utm_medium, utm_campaign,
                duration_ms, date_created
            ) VALUES (
                ?1,  ?2,  ?3,  ?4,  ?5,
                ?6,  ?7,  ?8,  ?9,  ?10,
                ?11, ?12, ?13,
                ?14, ?15, ?16,
                NULL, CAST(?17 AS TIMESTAMP)
            )"#,
            duckdb::params![
                view.bid,
                view.hostname,
                view.pathname,
                view.is_unique_user,
                view.is_unique_page,
                view.referrer_host,
                view.referrer_group,
                view.country,
                view.language_base,
                view.language_dialect,
                view.ua_browser,
                view.ua_os,
                view.ua_device_type,
                view.utm_source,
                view.utm_medium,
                view.utm_campaign,
                sql_timestamp(&view.date_created),
            ],
        )?;
        insert_custom_events(&tx, properties)?;

        tx.commit()?;
        tracing::debug!(
            hostname = %view.hostname,
            properties = properties.len(),
            "Stored page view"
        );
        Ok(())
    }

    async fn update_duration(&self, duration: &PageViewDuration) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE views SET duration_ms = ?1 WHERE bid = ?2",
            duckdb::params![duration.duration_ms, duration.bid],
        )?;
        if updated == 0 {
            tracing::debug!(bid = %duration.bid, "No page view for unload beacon");
        }
        Ok(())
    }

    async fn append_custom_events(&self, events: &[CustomEventHit]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        insert_custom_events(&tx, events)?;
        tx.commit()?;
        tracing::debug!(count = events.len(), "Stored custom events");
        Ok(())
    }
}
