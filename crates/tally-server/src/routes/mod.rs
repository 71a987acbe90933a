pub mod event;
pub mod health;
pub mod stats;
