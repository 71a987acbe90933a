use async_trait::async_trait;

use tally_core::analytics::{
    AnalyticsBackend, Dimension, DimensionRow, Interval, IntervalRow, PageRow, PropertyRow,
    ReferrerRow, StatsFilter, Summary, TimeRow,
};

use crate::queries;
use crate::DuckDbBackend;

#[async_trait]
impl AnalyticsBackend for DuckDbBackend {
    async fn summary(&self, filter: &StatsFilter) -> anyhow::Result<Summary> {
        queries::summary::summary_inner(self, filter).await
    }

    async fn intervals(
        &self,
        filter: &StatsFilter,
        interval: Interval,
    ) -> anyhow::Result<Vec<IntervalRow>> {
        queries::summary::intervals_inner(self, filter, interval).await
    }

    async fn pages(&self, filter: &StatsFilter) -> anyhow::Result<Vec<PageRow>> {
        queries::pages::pages_inner(self, filter).await
    }

    async fn referrers(
        &self,
        filter: &StatsFilter,
        grouped: bool,
    ) -> anyhow::Result<Vec<ReferrerRow>> {
        queries::referrers::referrers_inner(self, filter, grouped).await
    }

    async fn time(&self, filter: &StatsFilter) -> anyhow::Result<Vec<TimeRow>> {
        queries::time::time_inner(self, filter).await
    }

    async fn dimension(
        &self,
        filter: &StatsFilter,
        dimension: Dimension,
    ) -> anyhow::Result<Vec<DimensionRow>> {
        queries::dimensions::dimension_inner(self, filter, dimension).await
    }

    async fn properties(
        &self,
        filter: &StatsFilter,
        property: Option<&str>,
    ) -> anyhow::Result<Vec<PropertyRow>> {
        queries::properties::properties_inner(self, filter, property).await
    }
}
