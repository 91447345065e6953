//! # Outbound Module
//!
//! Rate governing for calls to external APIs. Wrap each call in
//! [`RateGovernor::execute`] with a stable endpoint key (typically the
//! provider's rate-limit bucket, e.g. `"POST /channels/{id}/messages"`).

pub mod errors;
pub mod governor;

pub use errors::{OutboundError, RateLimitSignal};
pub use governor::RateGovernor;
