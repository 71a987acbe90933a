use anyhow::{Context, Result};

use tally_core::analytics::{Interval, IntervalRow, StatsFilter, Summary};

use crate::queries::fetch_all;
use crate::sql::args::Args;
use crate::sql::builder::QueryBuilder;
use crate::sql::filter::Source;
use crate::sql::fragments::{bounces_cte, pageviews, visitors, DURATION, UNIQUE_USERS};
use crate::DuckDbBackend;

pub fn summary_query(filter: &StatsFilter, args: &mut Args) -> String {
    let source = Source::views(filter, args);
    source
        .apply(
            QueryBuilder::new()
                .with_materialized("bounces", bounces_cte(&source))
                .select([
                    visitors(UNIQUE_USERS),
                    pageviews(),
                    "(SELECT bounced FROM bounces) AS bounces".to_string(),
                    "ifnull(ROUND((SELECT bounced FROM bounces) / NULLIF((SELECT measured FROM bounces), 0), 4), 0) \
                     AS bounce_percentage"
                        .to_string(),
                    DURATION.to_string(),
                ]),
        )
        .build()
}

pub async fn summary_inner(db: &DuckDbBackend, filter: &StatsFilter) -> Result<Summary> {
    let mut args = Args::new();
    let sql = summary_query(filter, &mut args);
    let rows = fetch_all(db, &sql, &args, |row| {
        Ok(Summary {
            visitors: row.get(0)?,
            pageviews: row.get(1)?,
            bounces: row.get(2)?,
            bounce_percentage: row.get(3)?,
            duration: row.get(4)?,
        })
    })
    .await?;
    rows.into_iter().next().context("summary query returned no rows")
}

pub fn intervals_query(filter: &StatsFilter, interval: Interval, args: &mut Args) -> String {
    let bucket = format!(
        "strftime(time_bucket(INTERVAL {}, views.date_created), '%Y-%m-%dT%H:%M:%SZ') AS bucket",
        interval.as_sql()
    );
    Source::views(filter, args)
        .apply(QueryBuilder::new().select([bucket, visitors(UNIQUE_USERS), pageviews()]))
        .group_by(["bucket"])
        .order_by(["bucket ASC"])
        .build()
}

pub async fn intervals_inner(
    db: &DuckDbBackend,
    filter: &StatsFilter,
    interval: Interval,
) -> Result<Vec<IntervalRow>> {
    let mut args = Args::new();
    let sql = intervals_query(filter, interval, &mut args);
    fetch_all(db, &sql, &args, |row| {
        Ok(IntervalRow {
            interval: row.get(0)?,
            visitors: row.get(1)?,
            pageviews: row.get(2)?,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_declares_bounces_cte_before_select() {
        let mut args = Args::new();
        let sql = summary_query(&StatsFilter::for_hostname("example.com"), &mut args);
        assert!(sql.starts_with("WITH bounces AS MATERIALIZED (SELECT"));
        assert!(sql.contains(
            "WHERE views.hostname = ?1 AND views.is_unique_page = true AND views.duration_ms IS NOT NULL)"
        ));
        assert!(sql.ends_with("FROM views WHERE views.hostname = ?1"));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn intervals_bucket_by_requested_width() {
        let mut args = Args::new();
        let sql = intervals_query(
            &StatsFilter::for_hostname("example.com"),
            Interval::Hour,
            &mut args,
        );
        assert!(sql.contains("time_bucket(INTERVAL 1 HOUR, views.date_created)"));
        assert!(sql.ends_with("GROUP BY bucket ORDER BY bucket ASC"));
    }
}
