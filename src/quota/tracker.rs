//! Windowed request counters per model class.
//!
//! Each class has a minute window and a day window. A window restarts at the
//! first check made after it has run for strictly longer than its length.
//! The current time is always passed in, never read from the clock here.

use super::policy::LimitPolicies;
use crate::model::ModelClass;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

const MINUTE_WINDOW_SECS: i64 = 60;
const DAY_WINDOW_SECS: i64 = 86_400;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied(Denial),
}

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Denial {
    PerMinute,
    PerDay,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerMinute => write!(f, "per-minute limit exceeded"),
            Self::PerDay => write!(f, "daily limit exceeded"),
        }
    }
}

#[derive(Debug)]
struct QuotaState {
    minute_count: u32,
    day_count: u32,
    minute_window_start: DateTime<Utc>,
    day_window_start: DateTime<Utc>,
}

fn expired(start: DateTime<Utc>, now: DateTime<Utc>, window_secs: i64) -> bool {
    now - start > Duration::seconds(window_secs)
}

impl QuotaState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            minute_count: 0,
            day_count: 0,
            minute_window_start: now,
            day_window_start: now,
        }
    }

    fn roll_windows(&mut self, now: DateTime<Utc>) {
        if expired(self.minute_window_start, now, MINUTE_WINDOW_SECS) {
            self.minute_count = 0;
            self.minute_window_start = now;
        }
        if expired(self.day_window_start, now, DAY_WINDOW_SECS) {
            self.day_count = 0;
            self.day_window_start = now;
        }
    }
}

/// Usage of one window as seen at a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    pub used: u32,
    pub limit: u32,
    /// End of the running window; `None` when it has already lapsed.
    pub resets_at: Option<DateTime<Utc>>,
}

impl WindowUsage {
    fn at(count: u32, limit: u32, start: DateTime<Utc>, now: DateTime<Utc>, window_secs: i64) -> Self {
        if expired(start, now, window_secs) {
            Self {
                used: 0,
                limit,
                resets_at: None,
            }
        } else {
            Self {
                used: count,
                limit,
                resets_at: Some(start + Duration::seconds(window_secs)),
            }
        }
    }
}

/// Read-only view of one class's quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub model_type: ModelClass,
    pub minute: WindowUsage,
    pub day: WindowUsage,
}

/// Owns the counters of every class, one lock per class.
///
/// The lock covers only the admission decision; callers release it before
/// any upstream I/O.
#[derive(Debug)]
pub struct QuotaTracker {
    policies: Arc<LimitPolicies>,
    states: [Mutex<QuotaState>; 4],
}

impl QuotaTracker {
    /// Fresh counters for every class, windows starting at `now`.
    pub fn new(policies: Arc<LimitPolicies>, now: DateTime<Utc>) -> Self {
        Self {
            policies,
            states: std::array::from_fn(|_| Mutex::new(QuotaState::new(now))),
        }
    }

    pub fn policies(&self) -> &LimitPolicies {
        &self.policies
    }

    // A poisoned lock still guards consistent counters.
    fn lock(&self, class: ModelClass) -> MutexGuard<'_, QuotaState> {
        self.states[class.index()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Roll expired windows, then admit and count the request if both the
    /// minute and the day quota have room. The minute quota is checked first.
    pub fn check_and_consume(&self, class: ModelClass, now: DateTime<Utc>) -> Admission {
        let policy = self.policies.policy_for(class);
        let mut state = self.lock(class);

        state.roll_windows(now);

        if state.minute_count >= policy.max_per_minute {
            return Admission::Denied(Denial::PerMinute);
        }
        if state.day_count >= policy.max_per_day {
            return Admission::Denied(Denial::PerDay);
        }

        state.minute_count += 1;
        state.day_count += 1;
        Admission::Admitted
    }

    /// Counters as an admission check at `now` would see them, without
    /// rolling any window.
    pub fn snapshot(&self, class: ModelClass, now: DateTime<Utc>) -> QuotaSnapshot {
        let policy = self.policies.policy_for(class);
        let state = self.lock(class);

        QuotaSnapshot {
            model_type: class,
            minute: WindowUsage::at(
                state.minute_count,
                policy.max_per_minute,
                state.minute_window_start,
                now,
                MINUTE_WINDOW_SECS,
            ),
            day: WindowUsage::at(
                state.day_count,
                policy.max_per_day,
                state.day_window_start,
                now,
                DAY_WINDOW_SECS,
            ),
        }
    }

    pub fn snapshot_all(&self, now: DateTime<Utc>) -> Vec<QuotaSnapshot> {
        ModelClass::ALL
            .iter()
            .map(|class| self.snapshot(*class, now))
            .collect()
    }
}
