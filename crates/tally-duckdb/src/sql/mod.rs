pub mod args;
pub mod builder;
pub mod filter;
pub mod fragments;

pub use args::Args;
pub use builder::QueryBuilder;
