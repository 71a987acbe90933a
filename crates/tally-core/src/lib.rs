pub mod analytics;
pub mod config;
pub mod error;
pub mod event;
pub mod ipfilter;
pub mod ratelimit;
pub mod referrer;
pub mod store;

pub use error::CoreError;
pub use ipfilter::IpFilter;
pub use ratelimit::{Admission, RateLimiter};
pub use referrer::{Referrer, ReferrerClassifier, ReferrerError};
