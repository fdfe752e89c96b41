//! Rate-limit budget tracking, pre-flight checking, and post-exceeded handling.
//!
//! `record` models the per-resource budget parsed from headers or the `/rate_limit` probe,
//! `checker` holds the pre-flight [`RateLimitChecker`] policies, `handler` holds the
//! [`RateLimitHandler`] policies consulted after the server reports exhaustion, and
//! `coordinator` ties them together behind one object owned by each client.

pub mod checker;
pub mod coordinator;
pub mod handler;
pub mod record;

pub use checker::*;
pub use coordinator::*;
pub use handler::*;
pub use record::*;
