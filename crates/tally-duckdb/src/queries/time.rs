use anyhow::Result;

use tally_core::analytics::{StatsFilter, TimeRow};

use crate::queries::fetch_all;
use crate::sql::args::Args;
use crate::sql::builder::QueryBuilder;
use crate::sql::filter::{pagination, Source};
use crate::sql::fragments::{visitors, UNIQUE_PAGES};
use crate::DuckDbBackend;

/// Pages with fewer unique visitors than this are left out as noise.
pub const MIN_TIME_SAMPLE: i64 = 3;

fn quantile(q: f64, alias: &str) -> String {
    format!("CAST(ifnull(quantile_cont(views.duration_ms, {q}), 0) AS BIGINT) AS {alias}")
}

pub fn time_query(filter: &StatsFilter, args: &mut Args) -> String {
    let source = Source::views(filter, args);
    let page = pagination(filter, args);
    source
        .apply(QueryBuilder::new().select([
            "views.pathname AS pathname".to_string(),
            quantile(0.5, "duration"),
            quantile(0.75, "duration_upper_quartile"),
            quantile(0.25, "duration_lower_quartile"),
            visitors(UNIQUE_PAGES),
        ]))
        .group_by(["views.pathname"])
        .having("quantile_cont(views.duration_ms, 0.5) > 0")
        .having(format!("{UNIQUE_PAGES} >= {MIN_TIME_SAMPLE}"))
        .order_by(["visitors DESC", "duration DESC", "pathname ASC"])
        .pagination(page)
        .build()
}

pub async fn time_inner(db: &DuckDbBackend, filter: &StatsFilter) -> Result<Vec<TimeRow>> {
    let mut args = Args::new();
    let sql = time_query(filter, &mut args);
    fetch_all(db, &sql, &args, |row| {
        Ok(TimeRow {
            pathname: row.get(0)?,
            duration: row.get(1)?,
            duration_upper_quartile: row.get(2)?,
            duration_lower_quartile: row.get(3)?,
            visitors: row.get(4)?,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_sample_is_enforced_in_having() {
        let mut args = Args::new();
        let sql = time_query(&StatsFilter::for_hostname("example.com"), &mut args);
        assert!(sql.contains(
            "HAVING quantile_cont(views.duration_ms, 0.5) > 0 AND \
             COUNT(*) FILTER (WHERE views.is_unique_page = true) >= 3"
        ));
    }
}
