use chrono::{DateTime, Utc};
use duckdb::types::Value;

/// Positional parameter list. Each bound value gets the next `?N` placeholder,
/// and a placeholder may appear several times in one statement.
#[derive(Debug, Default)]
pub struct Args {
    values: Vec<Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        format!("?{}", self.values.len())
    }

    /// Bind a UTC instant as a naive `TIMESTAMP` literal.
    pub fn bind_timestamp(&mut self, ts: &DateTime<Utc>) -> String {
        let placeholder = self.bind(sql_timestamp(ts));
        format!("CAST({placeholder} AS TIMESTAMP)")
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Timestamps are stored as UTC wall-clock time without an offset.
pub fn sql_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn placeholders_are_numbered_in_bind_order() {
        let mut args = Args::new();
        assert_eq!(args.bind("example.com".to_string()), "?1");
        assert_eq!(args.bind(10_i64), "?2");
        assert_eq!(args.len(), 2);
        assert_eq!(args.values()[1], Value::BigInt(10));
    }

    #[test]
    fn timestamps_bind_as_cast_naive_utc() {
        let mut args = Args::new();
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).single().expect("valid");
        assert_eq!(args.bind_timestamp(&ts), "CAST(?1 AS TIMESTAMP)");
        assert_eq!(args.values()[0], Value::Text("2024-03-01 12:30:00.000000".to_string()));
    }
}
