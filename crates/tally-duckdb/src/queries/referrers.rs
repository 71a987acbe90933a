use anyhow::Result;

use tally_core::analytics::{ReferrerRow, StatsFilter};

use crate::queries::fetch_all;
use crate::sql::args::Args;
use crate::sql::builder::QueryBuilder;
use crate::sql::filter::{pagination, Source};
use crate::sql::fragments::{
    bounce_percentage, share_of_total, total_cte, visitors, DURATION, UNIQUE_PAGES,
};
use crate::DuckDbBackend;

/// Hosts without a group fall back to the host itself.
const GROUP_OR_HOST: &str = "ifnull(nullif(views.referrer_group, ''), views.referrer_host)";

pub fn referrers_query(filter: &StatsFilter, grouped: bool, args: &mut Args) -> String {
    let column = if grouped {
        GROUP_OR_HOST
    } else {
        "views.referrer_host"
    };
    let source = Source::views(filter, args);
    let page = pagination(filter, args);
    source
        .apply(
            QueryBuilder::new()
                .with_materialized("total", total_cte(&source, UNIQUE_PAGES))
                .select([
                    format!("{column} AS referrer"),
                    visitors(UNIQUE_PAGES),
                    share_of_total(UNIQUE_PAGES, "total_visitors", "visitors_percentage"),
                    bounce_percentage(),
                    DURATION.to_string(),
                ]),
        )
        .group_by([column])
        .order_by(["visitors DESC", "referrer ASC"])
        .pagination(page)
        .build()
}

pub async fn referrers_inner(
    db: &DuckDbBackend,
    filter: &StatsFilter,
    grouped: bool,
) -> Result<Vec<ReferrerRow>> {
    let mut args = Args::new();
    let sql = referrers_query(filter, grouped, &mut args);
    fetch_all(db, &sql, &args, |row| {
        Ok(ReferrerRow {
            referrer: row.get(0)?,
            visitors: row.get(1)?,
            visitors_percentage: row.get(2)?,
            bounce_percentage: row.get(3)?,
            duration: row.get(4)?,
        })
    })
    .await
}
