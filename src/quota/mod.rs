//! Per-model-class request quotas.
//!
//! [`LimitPolicies`] holds the immutable thresholds for every class and
//! [`QuotaTracker`] owns the windowed counters that enforce them.

mod policy;
mod tracker;

pub use policy::{Ceiling, LimitPolicies, LimitPolicy};
pub use tracker::{Admission, Denial, QuotaSnapshot, QuotaTracker, WindowUsage};
