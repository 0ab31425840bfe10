//! Consecutive fetch failure tracking for a single poller.
//!
//! Decides when a failure is worth an owner alert:
//! - transient and unclassified errors after [`DEFAULT_ESCALATION_THRESHOLD`]
//!   consecutive occurrences (the counter restarts after each alert)
//! - payload shape errors once per streak
//! - auth errors immediately, with a longer delay before the next poll

use std::time::Duration;

use chrono::{DateTime, Utc};
use outage_sources::{ErrorKind, SourceError};

pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 3;
pub const DEFAULT_AUTH_BACKOFF: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Log only.
    Log,
    /// Report to the owner.
    Escalate,
    /// Report to the owner and wait this long before polling again.
    EscalateAndBackoff(Duration),
}

/// Information about the current failure streak.
#[derive(Debug, Clone)]
pub struct FailureInfo {
    /// Number of consecutive failures.
    pub count: u32,
    pub first_failure: DateTime<Utc>,
    pub last_error: String,
}

pub struct FailureTracker {
    threshold: u32,
    auth_backoff: Duration,
    /// Failures since the last alert.
    pending: u32,
    streak: Option<FailureInfo>,
    data_shape_reported: bool,
}

impl FailureTracker {
    pub fn new(threshold: u32, auth_backoff: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            auth_backoff,
            pending: 0,
            streak: None,
            data_shape_reported: false,
        }
    }

    pub fn record_failure(&mut self, error: &SourceError) -> FailureAction {
        let now = Utc::now();
        let streak = self.streak.get_or_insert_with(|| FailureInfo {
            count: 0,
            first_failure: now,
            last_error: String::new(),
        });
        streak.count += 1;
        streak.last_error = error.to_string();

        match error.kind() {
            ErrorKind::Auth => {
                self.pending = 0;
                FailureAction::EscalateAndBackoff(self.auth_backoff)
            }
            ErrorKind::DataShape => {
                if self.data_shape_reported {
                    FailureAction::Log
                } else {
                    self.data_shape_reported = true;
                    FailureAction::Escalate
                }
            }
            ErrorKind::Transient | ErrorKind::Other => {
                self.pending += 1;
                if self.pending >= self.threshold {
                    self.pending = 0;
                    FailureAction::Escalate
                } else {
                    FailureAction::Log
                }
            }
        }
    }

    /// Clears the streak. Returns the finished streak, if there was one.
    pub fn record_success(&mut self) -> Option<FailureInfo> {
        self.pending = 0;
        self.data_shape_reported = false;
        self.streak.take()
    }

    pub fn failure_count(&self) -> u32 {
        self.streak.as_ref().map(|s| s.count).unwrap_or(0)
    }

    pub fn current_streak(&self) -> Option<&FailureInfo> {
        self.streak.as_ref()
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ESCALATION_THRESHOLD, DEFAULT_AUTH_BACKOFF)
    }
}
