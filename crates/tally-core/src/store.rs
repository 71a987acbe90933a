use async_trait::async_trait;

use crate::event::{CustomEventHit, PageViewDuration, PageViewHit};

/// Write side of the event store.
///
/// Implementations must make each call atomic: a page view and its
/// properties land together or not at all.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    async fn append_page_view(
        &self,
        view: &PageViewHit,
        properties: &[CustomEventHit],
    ) -> anyhow::Result<()>;

    /// Set the duration of the view with the same beacon id. A missing view
    /// is not an error.
    async fn update_duration(&self, duration: &PageViewDuration) -> anyhow::Result<()>;

    async fn append_custom_events(&self, events: &[CustomEventHit]) -> anyhow::Result<()>;
}
