use anyhow::Result;

use tally_core::analytics::{FilterCondition, PropertyRow, StatsFilter};

use crate::queries::fetch_all;
use crate::sql::args::Args;
use crate::sql::builder::QueryBuilder;
use crate::sql::filter::{pagination, Source};
use crate::sql::fragments::EVENT_COUNT;
use crate::DuckDbBackend;

/// Without `property`, list property names with event counts; with it, list
/// the values recorded for that property.
pub fn properties_query(filter: &StatsFilter, property: Option<&str>, args: &mut Args) -> String {
    let (column, filter) = match property.filter(|p| !p.is_empty()) {
        Some(name) => {
            let mut filter = filter.clone();
            filter.property_name = Some(FilterCondition::eq(name));
            ("events.value", filter)
        }
        None => ("events.name", filter.clone()),
    };

    let source = Source::events(&filter, args);
    let page = pagination(&filter, args);
    source
        .apply(QueryBuilder::new().select([format!("{column} AS value"), EVENT_COUNT.to_string()]))
        .group_by([column])
        .order_by(["event_count DESC", "value ASC"])
        .pagination(page)
        .build()
}

pub async fn properties_inner(
    db: &DuckDbBackend,
    filter: &StatsFilter,
    property: Option<&str>,
) -> Result<Vec<PropertyRow>> {
    let mut args = Args::new();
    let sql = properties_query(filter, property, &mut args);
    fetch_all(db, &sql, &args, |row| {
        Ok(PropertyRow {
            value: row.get(0)?,
            events: row.get(1)?,
        })
    })
    .await
}
