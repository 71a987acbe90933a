//! Read-side report queries. Each module builds its SQL with
//! [`crate::sql::builder::QueryBuilder`] and binds every value through
//! [`crate::sql::args::Args`].

pub mod dimensions;
pub mod pages;
pub mod properties;
pub mod referrers;
pub mod summary;
pub mod time;

use anyhow::Result;

use crate::sql::args::Args;
use crate::DuckDbBackend;

/// Run `sql` with `args` and map every row.
pub(crate) async fn fetch_all<T, F>(
    db: &DuckDbBackend,
    sql: &str,
    args: &Args,
    map: F,
) -> Result<Vec<T>>
where
    F: FnMut(&duckdb::Row<'_>) -> duckdb::Result<T> + Send,
    T: Send,
{
    tracing::trace!(sql, params = args.len(), "Running report query");
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(duckdb::params_from_iter(args.values()), map)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}
