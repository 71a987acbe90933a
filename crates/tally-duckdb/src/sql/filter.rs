//! Renders a [`StatsFilter`] into a bound `WHERE` clause.

use tally_core::analytics::{FilterCondition, FilterOp, StatsFilter};

use super::args::Args;
use super::builder::QueryBuilder;

const EVENTS_JOIN_VIEWS: &str = "views ON events.bid = views.bid";

/// The table set a report reads from, with the filter already rendered
/// against it.
#[derive(Debug, Clone)]
pub struct Source {
    from: &'static str,
    join: Option<&'static str>,
    where_sql: String,
}

impl Source {
    /// Page views. Property filters become a semi-join on `events`, so each
    /// view is still counted once however many properties it carries.
    pub fn views(filter: &StatsFilter, args: &mut Args) -> Self {
        Self {
            from: "views",
            join: None,
            where_sql: render(filter, Table::Views, args),
        }
    }

    /// Custom events, with their page view (if any) joined for view-level filters.
    pub fn events(filter: &StatsFilter, args: &mut Args) -> Self {
        Self {
            from: "events",
            join: Some(EVENTS_JOIN_VIEWS),
            where_sql: render(filter, Table::Events, args),
        }
    }

    /// Same source with one more `AND` condition.
    pub fn and(&self, condition: &str) -> Self {
        Self {
            from: self.from,
            join: self.join,
            where_sql: format!("{} AND {condition}", self.where_sql),
        }
    }

    pub fn where_sql(&self) -> &str {
        &self.where_sql
    }

    pub fn apply(&self, query: QueryBuilder) -> QueryBuilder {
        let query = query.from([self.from]).where_clause(self.where_sql.as_str());
        match self.join {
            Some(join) => query.left_join(join),
            None => query,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Views,
    Events,
}

fn render(filter: &StatsFilter, table: Table, args: &mut Args) -> String {
    let (hostname_col, date_col) = match table {
        Table::Views => ("views.hostname", "views.date_created"),
        Table::Events => ("events.group_name", "events.date_created"),
    };
    let mut clauses = vec![format!("{hostname_col} = {}", args.bind(filter.hostname.clone()))];

    push(&mut clauses, "views.pathname", filter.pathname.as_ref(), args);

    // Direct traffic (empty host) has no group to match against.
    match &filter.referrer {
        Some(cond) if !cond.value.is_empty() => clauses.push(either(
            "views.referrer_host",
            "views.referrer_group",
            cond,
            args,
        )),
        other => push(&mut clauses, "views.referrer_host", other.as_ref(), args),
    }

    push(&mut clauses, "views.utm_source", filter.utm_source.as_ref(), args);
    push(&mut clauses, "views.utm_medium", filter.utm_medium.as_ref(), args);
    push(&mut clauses, "views.utm_campaign", filter.utm_campaign.as_ref(), args);
    push(&mut clauses, "views.ua_browser", filter.browser.as_ref(), args);
    push(&mut clauses, "views.ua_os", filter.os.as_ref(), args);
    push(&mut clauses, "views.ua_device_type", filter.device.as_ref(), args);
    push(&mut clauses, "views.country", filter.country.as_ref(), args);
    if let Some(cond) = &filter.language {
        clauses.push(either(
            "views.language_base",
            "views.language_dialect",
            cond,
            args,
        ));
    }
    if filter.uses_custom_events() {
        let mut props = Vec::new();
        push(&mut props, "events.name", filter.property_name.as_ref(), args);
        push(&mut props, "events.value", filter.property_value.as_ref(), args);
        let props = props.join(" AND ");
        clauses.push(match table {
            Table::Views => {
                format!("views.bid IN (SELECT events.bid FROM events WHERE {props})")
            }
            Table::Events => props,
        });
    }

    if let Some(start) = &filter.period_start {
        clauses.push(format!("{date_col} >= {}", args.bind_timestamp(start)));
    }
    if let Some(end) = &filter.period_end {
        clauses.push(format!("{date_col} <= {}", args.bind_timestamp(end)));
    }

    clauses.join(" AND ")
}

fn push(clauses: &mut Vec<String>, column: &str, cond: Option<&FilterCondition>, args: &mut Args) {
    if let Some(cond) = cond {
        clauses.push(condition(column, cond, args));
    }
}

/// Match either column. A negated operator must hold for both.
fn either(first: &str, second: &str, cond: &FilterCondition, args: &mut Args) -> String {
    let joiner = if cond.op.is_negated() { "AND" } else { "OR" };
    format!(
        "({} {joiner} {})",
        condition(first, cond, args),
        condition(second, cond, args)
    )
}

fn condition(column: &str, cond: &FilterCondition, args: &mut Args) -> String {
    let value = args.bind(cond.value.clone());
    match cond.op {
        FilterOp::Eq => format!("{column} ILIKE {value}"),
        FilterOp::Neq => format!("{column} NOT ILIKE {value}"),
        FilterOp::Contains => format!("contains(lower({column}), {value})"),
        FilterOp::NotContains => format!("NOT contains(lower({column}), {value})"),
        FilterOp::StartsWith => format!("starts_with(lower({column}), {value})"),
        FilterOp::NotStartsWith => format!("NOT starts_with(lower({column}), {value})"),
        FilterOp::EndsWith => format!("ends_with(lower({column}), {value})"),
        FilterOp::NotEndsWith => format!("NOT ends_with(lower({column}), {value})"),
    }
}

/// `LIMIT`/`OFFSET` fragment for the builder's pagination slot.
pub fn pagination(filter: &StatsFilter, args: &mut Args) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(limit) = filter.limit.filter(|l| *l > 0) {
        parts.push(format!("LIMIT {}", args.bind(limit)));
    }
    if let Some(offset) = filter.offset.filter(|o| *o > 0) {
        parts.push(format!("OFFSET {}", args.bind(offset)));
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}
