//! Clause-ordered SQL composer.
//!
//! Knows nothing about analytics: callers hand it finished fragments and it
//! emits them in the fixed order `WITH … SELECT … FROM … LEFT JOIN … WHERE …
//! GROUP BY … HAVING … ORDER BY … <pagination>`, leaving out every clause
//! that was never set.

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    ctes: Vec<(String, QueryBuilder)>,
    select: Vec<String>,
    from: Vec<String>,
    left_join: Option<String>,
    where_clause: Option<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    order_by: Vec<String>,
    pagination: Option<String>,
}

fn owned<I, S>(items: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into)
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `name AS MATERIALIZED (subquery)` CTE. CTEs render in the order added.
    pub fn with_materialized(mut self, name: impl Into<String>, subquery: QueryBuilder) -> Self {
        self.ctes.push((name.into(), subquery));
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(owned(columns));
        self
    }

    pub fn from<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.from.extend(owned(tables));
        self
    }

    pub fn left_join(mut self, join: impl Into<String>) -> Self {
        self.left_join = Some(join.into());
        self
    }

    pub fn where_clause(mut self, condition: impl Into<String>) -> Self {
        let condition = condition.into();
        self.where_clause = (!condition.is_empty()).then_some(condition);
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(owned(columns));
        self
    }

    /// Conditions accumulate and are joined with `AND`.
    pub fn having(mut self, condition: impl Into<String>) -> Self {
        self.having.push(condition.into());
        self
    }

    pub fn order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by.extend(owned(columns));
        self
    }

    /// Raw trailing fragment such as `LIMIT ?3 OFFSET ?4`. Always rendered last.
    pub fn pagination(mut self, fragment: Option<String>) -> Self {
        self.pagination = fragment.filter(|f| !f.is_empty());
        self
    }

    pub fn build(&self) -> String {
        let mut sql = String::new();

        for (idx, (name, subquery)) in self.ctes.iter().enumerate() {
            sql.push_str(if idx == 0 { "WITH " } else { ", " });
            sql.push_str(name);
            sql.push_str(" AS MATERIALIZED (");
            sql.push_str(&subquery.build());
            sql.push(')');
        }
        if !self.ctes.is_empty() {
            sql.push(' ');
        }

        sql.push_str("SELECT ");
        sql.push_str(&self.select.join(", "));

        if !self.from.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&self.from.join(", "));
        }
        if let Some(join) = &self.left_join {
            sql.push_str(" LEFT JOIN ");
            sql.push_str(join);
        }
        if let Some(condition) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having.join(" AND "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(pagination) = &self.pagination {
            sql.push(' ');
            sql.push_str(pagination);
        }

        sql
    }
}
