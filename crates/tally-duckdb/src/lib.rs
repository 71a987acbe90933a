pub mod analytics_impl;
pub mod backend;
pub mod queries;
pub mod schema;
pub mod settings;
pub mod sql;
pub mod website;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `tally_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
