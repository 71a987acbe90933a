//! Single-column breakdowns: browsers, OS, devices, countries, languages and
//! the three UTM fields share this query.

use anyhow::Result;

use tally_core::analytics::{Dimension, DimensionRow, StatsFilter};

use crate::queries::fetch_all;
use crate::sql::args::Args;
use crate::sql::builder::QueryBuilder;
use crate::sql::filter::{pagination, Source};
use crate::sql::fragments::{
    bounce_percentage, share_of_total, total_cte, visitors, DURATION, UNIQUE_PAGES,
};
use crate::DuckDbBackend;

pub fn dimension_query(filter: &StatsFilter, dimension: Dimension, args: &mut Args) -> String {
    let column = format!("views.{}", dimension.column());
    let source = Source::views(filter, args);
    let page = pagination(filter, args);
    source
        .apply(
            QueryBuilder::new()
                .with_materialized("total", total_cte(&source, UNIQUE_PAGES))
                .select([
                    format!("{column} AS value"),
                    visitors(UNIQUE_PAGES),
                    share_of_total(UNIQUE_PAGES, "total_visitors", "visitors_percentage"),
                    bounce_percentage(),
                    DURATION.to_string(),
                ]),
        )
        .group_by([column])
        .order_by(["visitors DESC", "value ASC"])
        .pagination(page)
        .build()
}

pub async fn dimension_inner(
    db: &DuckDbBackend,
    filter: &StatsFilter,
    dimension: Dimension,
) -> Result<Vec<DimensionRow>> {
    let mut args = Args::new();
    let sql = dimension_query(filter, dimension, &mut args);
    fetch_all(db, &sql, &args, |row| {
        Ok(DimensionRow {
            value: row.get(0)?,
            visitors: row.get(1)?,
            visitors_percentage: row.get(2)?,
            bounce_percentage: row.get(3)?,
            duration: row.get(4)?,
        })
    })
    .await
}
