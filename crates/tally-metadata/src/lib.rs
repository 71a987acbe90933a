use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Website {
    pub hostname: String,
    pub name: String,
    pub created_at: String,
}

/// Lookup of the websites that are allowed to receive hits.
///
/// The DuckDB backend implements this against its `websites` table; tests
/// substitute an in-memory list.
#[async_trait]
pub trait WebsiteRegistry: Send + Sync + 'static {
    async fn is_registered_hostname(&self, hostname: &str) -> anyhow::Result<bool>;

    async fn get_website(&self, hostname: &str) -> anyhow::Result<Option<Website>>;
}
