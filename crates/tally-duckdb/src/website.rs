use anyhow::Result;
use async_trait::async_trait;

use tally_metadata::{Website, WebsiteRegistry};

use crate::DuckDbBackend;

impl DuckDbBackend {
    /// Insert a website, or rename it if the hostname already exists.
    ///
    /// Used by test fixtures and startup registration from `TALLY_WEBSITES`.
    pub async fn seed_website(&self, hostname: &str, name: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO websites (hostname, name, created_at)
               VALUES (?1, ?2, CURRENT_TIMESTAMP)
               ON CONFLICT (hostname) DO UPDATE SET name = EXCLUDED.name"#,
            duckdb::params![hostname, name],
        )?;
        Ok(())
    }

    pub async fn hostname_exists(&self, hostname: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM websites WHERE hostname = ?1")?;
        let count: i64 = stmt.query_row(duckdb::params![hostname], |row| row.get(0))?;
        Ok(count > 0)
    }

    pub async fn list_websites(&self) -> Result<Vec<Website>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT hostname, name, CAST(created_at AS VARCHAR) FROM websites ORDER BY hostname",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Website {
                hostname: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl WebsiteRegistry for DuckDbBackend {
    async fn is_registered_hostname(&self, hostname: &str) -> Result<bool> {
        self.hostname_exists(hostname).await
    }

    async fn get_website(&self, hostname: &str) -> Result<Option<Website>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT hostname, name, CAST(created_at AS VARCHAR) FROM websites WHERE hostname = ?1",
        )?;
        let mut rows = stmt.query_map(duckdb::params![hostname], |row| {
            Ok(Website {
                hostname: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }
}
