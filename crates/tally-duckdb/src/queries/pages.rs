use anyhow::Result;

use tally_core::analytics::{PageRow, StatsFilter};

use crate::queries::fetch_all;
use crate::sql::args::Args;
use crate::sql::builder::QueryBuilder;
use crate::sql::filter::{pagination, Source};
use crate::sql::fragments::{
    bounce_percentage, pageviews, share_of_total, total_cte, visitors, DURATION, PAGEVIEWS,
    UNIQUE_PAGES,
};
use crate::DuckDbBackend;

pub fn pages_query(filter: &StatsFilter, args: &mut Args) -> String {
    let source = Source::views(filter, args);
    let page = pagination(filter, args);
    source
        .apply(
            QueryBuilder::new()
                .with_materialized("total", total_cte(&source, UNIQUE_PAGES))
                .select([
                    "views.pathname AS pathname".to_string(),
                    visitors(UNIQUE_PAGES),
                    share_of_total(UNIQUE_PAGES, "total_visitors", "visitors_percentage"),
                    pageviews(),
                    share_of_total(PAGEVIEWS, "total_pageviews", "pageviews_percentage"),
                    bounce_percentage(),
                    DURATION.to_string(),
                ]),
        )
        .group_by(["views.pathname"])
        .having(format!("{UNIQUE_PAGES} > 0"))
        .order_by(["visitors DESC", "pageviews DESC", "pathname ASC"])
        .pagination(page)
        .build()
}

pub async fn pages_inner(db: &DuckDbBackend, filter: &StatsFilter) -> Result<Vec<PageRow>> {
    let mut args = Args::new();
    let sql = pages_query(filter, &mut args);
    fetch_all(db, &sql, &args, |row| {
        Ok(PageRow {
            pathname: row.get(0)?,
            visitors: row.get(1)?,
            visitors_percentage: row.get(2)?,
            pageviews: row.get(3)?,
            pageviews_percentage: row.get(4)?,
            bounce_percentage: row.get(5)?,
            duration: row.get(6)?,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_follows_order_by() {
        let mut filter = StatsFilter::for_hostname("example.com");
        filter.limit = Some(5);
        let mut args = Args::new();
        let sql = pages_query(&filter, &mut args);
        assert!(sql.ends_with("ORDER BY visitors DESC, pageviews DESC, pathname ASC LIMIT ?2"));
        assert!(sql.contains("HAVING COUNT(*) FILTER (WHERE views.is_unique_page = true) > 0"));
    }
}
