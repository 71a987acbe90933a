//! Analytics backend abstraction.

use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// String match operator for a single filter field. Matching is always
/// case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
}

impl FilterOp {
    pub const ALL: [FilterOp; 8] = [
        FilterOp::Eq,
        FilterOp::Neq,
        FilterOp::Contains,
        FilterOp::NotContains,
        FilterOp::StartsWith,
        FilterOp::NotStartsWith,
        FilterOp::EndsWith,
        FilterOp::NotEndsWith,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Contains => "contains",
            FilterOp::NotContains => "not_contains",
            FilterOp::StartsWith => "starts_with",
            FilterOp::NotStartsWith => "not_starts_with",
            FilterOp::EndsWith => "ends_with",
            FilterOp::NotEndsWith => "not_ends_with",
        }
    }

    pub fn is_negated(self) -> bool {
        matches!(
            self,
            FilterOp::Neq | FilterOp::NotContains | FilterOp::NotStartsWith | FilterOp::NotEndsWith
        )
    }
}

impl FromStr for FilterOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        FilterOp::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| anyhow!("unknown filter operator: {s}"))
    }
}

/// One `field <op> value` condition. The value is lowercased on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCondition {
    pub op: FilterOp,
    pub value: String,
}

impl FilterCondition {
    pub fn new(op: FilterOp, value: impl AsRef<str>) -> Self {
        Self {
            op,
            value: value.as_ref().to_lowercase(),
        }
    }

    pub fn eq(value: impl AsRef<str>) -> Self {
        Self::new(FilterOp::Eq, value)
    }
}

/// Filters applied uniformly to every report.
#[derive(Debug, Clone, Default)]
pub struct StatsFilter {
    pub hostname: String,
    pub pathname: Option<FilterCondition>,
    /// Matched against the referrer host or its group. An `eq ""` condition
    /// selects direct traffic and skips the group.
    pub referrer: Option<FilterCondition>,
    pub utm_source: Option<FilterCondition>,
    pub utm_medium: Option<FilterCondition>,
    pub utm_campaign: Option<FilterCondition>,
    pub browser: Option<FilterCondition>,
    pub os: Option<FilterCondition>,
    pub device: Option<FilterCondition>,
    pub country: Option<FilterCondition>,
    /// Matched against the base language or the dialect.
    pub language: Option<FilterCondition>,
    pub property_name: Option<FilterCondition>,
    pub property_value: Option<FilterCondition>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl StatsFilter {
    pub fn for_hostname(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Whether the filter reads custom-event rows.
    pub fn uses_custom_events(&self) -> bool {
        self.property_name.is_some() || self.property_value.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl Interval {
    /// Bucket width as a DuckDB interval literal.
    pub fn as_sql(self) -> &'static str {
        match self {
            Interval::Minute => "1 MINUTE",
            Interval::Hour => "1 HOUR",
            Interval::Day => "1 DAY",
            Interval::Week => "1 WEEK",
            Interval::Month => "1 MONTH",
        }
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "minute" => Ok(Interval::Minute),
            "hour" => Ok(Interval::Hour),
            "day" => Ok(Interval::Day),
            "week" => Ok(Interval::Week),
            "month" => Ok(Interval::Month),
            other => Err(anyhow!(
                "interval must be one of: minute, hour, day, week, month (got {other})"
            )),
        }
    }
}

/// A single-column breakdown over page views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Browsers,
    Os,
    Devices,
    Countries,
    Languages,
    UtmSources,
    UtmMediums,
    UtmCampaigns,
}

impl Dimension {
    pub const ALL: [Dimension; 8] = [
        Dimension::Browsers,
        Dimension::Os,
        Dimension::Devices,
        Dimension::Countries,
        Dimension::Languages,
        Dimension::UtmSources,
        Dimension::UtmMediums,
        Dimension::UtmCampaigns,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Dimension::Browsers => "ua_browser",
            Dimension::Os => "ua_os",
            Dimension::Devices => "ua_device_type",
            Dimension::Countries => "country",
            Dimension::Languages => "language_base",
            Dimension::UtmSources => "utm_source",
            Dimension::UtmMediums => "utm_medium",
            Dimension::UtmCampaigns => "utm_campaign",
        }
    }

    pub fn report_name(self) -> &'static str {
        match self {
            Dimension::Browsers => "browsers",
            Dimension::Os => "os",
            Dimension::Devices => "devices",
            Dimension::Countries => "countries",
            Dimension::Languages => "languages",
            Dimension::UtmSources => "utm_sources",
            Dimension::UtmMediums => "utm_mediums",
            Dimension::UtmCampaigns => "utm_campaigns",
        }
    }

    pub fn from_report_name(name: &str) -> Option<Self> {
        Dimension::ALL.into_iter().find(|d| d.report_name() == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub visitors: i64,
    pub pageviews: i64,
    pub bounces: i64,
    /// Bounces over unique page views with a measured duration, 0–1.
    pub bounce_percentage: f64,
    /// Median page duration in milliseconds.
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalRow {
    pub interval: String,
    pub visitors: i64,
    pub pageviews: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRow {
    pub pathname: String,
    pub visitors: i64,
    pub visitors_percentage: f64,
    pub pageviews: i64,
    pub pageviews_percentage: f64,
    pub bounce_percentage: f64,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferrerRow {
    /// Referrer host, or the canonical group when grouped.
    pub referrer: String,
    pub visitors: i64,
    pub visitors_percentage: f64,
    pub bounce_percentage: f64,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRow {
    pub pathname: String,
    pub duration: i64,
    pub duration_upper_quartile: i64,
    pub duration_lower_quartile: i64,
    pub visitors: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionRow {
    pub value: String,
    pub visitors: i64,
    pub visitors_percentage: f64,
    pub bounce_percentage: f64,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRow {
    /// Property name, or the property value when listing one property.
    pub value: String,
    pub events: i64,
}

#[async_trait::async_trait]
pub trait AnalyticsBackend: Send + Sync + 'static {
    async fn summary(&self, filter: &StatsFilter) -> anyhow::Result<Summary>;

    async fn intervals(
        &self,
        filter: &StatsFilter,
        interval: Interval,
    ) -> anyhow::Result<Vec<IntervalRow>>;

    async fn pages(&self, filter: &StatsFilter) -> anyhow::Result<Vec<PageRow>>;

    async fn referrers(&self, filter: &StatsFilter, grouped: bool)
        -> anyhow::Result<Vec<ReferrerRow>>;

    async fn time(&self, filter: &StatsFilter) -> anyhow::Result<Vec<TimeRow>>;

    async fn dimension(
        &self,
        filter: &StatsFilter,
        dimension: Dimension,
    ) -> anyhow::Result<Vec<DimensionRow>>;

    /// Without `property`, lists property names; with it, lists the values
    /// recorded for that property.
    async fn properties(
        &self,
        filter: &StatsFilter,
        property: Option<&str>,
    ) -> anyhow::Result<Vec<PropertyRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_ops_parse_from_wire_names() {
        for op in FilterOp::ALL {
            assert_eq!(op.as_str().parse::<FilterOp>().expect("known op"), op);
        }
        assert!("in".parse::<FilterOp>().is_err());
    }

    #[test]
    fn condition_values_are_lowercased() {
        let cond = FilterCondition::new(FilterOp::Contains, "Chrome");
        assert_eq!(cond.value, "chrome");
    }

    #[test]
    fn property_filters_enable_custom_event_join() {
        let mut filter = StatsFilter::for_hostname("example.com");
        assert!(!filter.uses_custom_events());
        filter.property_value = Some(FilterCondition::eq("pro"));
        assert!(filter.uses_custom_events());
    }

    #[test]
    fn dimensions_round_trip_report_names() {
        for dim in Dimension::ALL {
            assert_eq!(Dimension::from_report_name(dim.report_name()), Some(dim));
        }
        assert_eq!(Dimension::from_report_name("pages"), None);
    }
}
