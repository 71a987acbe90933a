//! Shared statistical fragments.
//!
//! Percentages divide by a `total` CTE built from the same source, so every
//! report that uses them must also add [`total_cte`].

use super::builder::QueryBuilder;
use super::filter::Source;

/// A visit shorter than this counts as a bounce.
pub const BOUNCE_THRESHOLD_MS: i64 = 5_000;

pub const UNIQUE_USERS: &str = "COUNT(*) FILTER (WHERE views.is_unique_user = true)";
pub const UNIQUE_PAGES: &str = "COUNT(*) FILTER (WHERE views.is_unique_page = true)";
pub const PAGEVIEWS: &str = "COUNT(*)";
pub const EVENT_COUNT: &str = "COUNT(*) AS event_count";
pub const DURATION: &str = "CAST(ifnull(median(views.duration_ms), 0) AS BIGINT) AS duration";

pub fn visitors(count: &str) -> String {
    format!("{count} AS visitors")
}

pub fn pageviews() -> String {
    format!("{PAGEVIEWS} AS pageviews")
}

/// `numerator` over a column of the `total` CTE, rounded to four places.
pub fn share_of_total(numerator: &str, total_column: &str, alias: &str) -> String {
    format!(
        "ifnull(ROUND({numerator} / NULLIF((SELECT {total_column} FROM total), 0), 4), 0) AS {alias}"
    )
}

/// Per-group bounce rate over unique page views that have a measured duration.
pub fn bounce_percentage() -> String {
    format!(
        "ifnull(ROUND(COUNT(*) FILTER (WHERE views.is_unique_page = true AND views.duration_ms < {BOUNCE_THRESHOLD_MS}) \
         / NULLIF(COUNT(*) FILTER (WHERE views.is_unique_page = true AND views.duration_ms IS NOT NULL), 0), 4), 0) \
         AS bounce_percentage"
    )
}

/// `total(total_visitors, total_pageviews)` over the whole filtered source.
pub fn total_cte(source: &Source, visitor_count: &str) -> QueryBuilder {
    source.apply(QueryBuilder::new().select([
        format!("{visitor_count} AS total_visitors"),
        format!("{PAGEVIEWS} AS total_pageviews"),
    ]))
}

/// `bounces(bounced, measured)`: unique page views with a duration, and how
/// many of those were short.
pub fn bounces_cte(source: &Source) -> QueryBuilder {
    source
        .and("views.is_unique_page = true AND views.duration_ms IS NOT NULL")
        .apply(QueryBuilder::new().select([
            format!("COUNT(*) FILTER (WHERE views.duration_ms < {BOUNCE_THRESHOLD_MS}) AS bounced"),
            "COUNT(*) AS measured".to_string(),
        ]))
}
