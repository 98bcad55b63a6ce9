//! Client-side idempotency guard.
//!
//! Two in-memory layers, both lost on process restart by design — restart
//! safety is delegated to the server ledger's uniqueness, this guard only
//! handles same-session noise:
//!
//! - an exclusive in-flight flag: while any verification is running, every
//!   other callback is dropped immediately;
//! - a set of transaction ids already submitted successfully this process
//!   lifetime: redundant platform redelivery is skipped without another
//!   server call. An id leaves the set only after a failure outcome, so a
//!   legitimate retry can proceed.

use std::collections::HashSet;
use std::sync::Mutex;

/// Decision for an incoming purchase callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No submission is in flight and the id is new: proceed.
    Proceed,
    /// Another submission is in flight (any transaction id): drop now.
    Busy,
    /// This id already went through successfully this session.
    AlreadySubmitted,
}

#[derive(Default)]
struct GuardState {
    in_flight: bool,
    submitted: HashSet<String>,
}

/// Serializes submissions and deduplicates redelivered transaction ids.
#[derive(Default)]
pub struct SubmissionGuard {
    state: Mutex<GuardState>,
}

impl SubmissionGuard {
    /// Create a fresh guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask to start a submission for `transaction_id`.
    ///
    /// On [`Admission::Proceed`] the in-flight flag is taken and the caller
    /// must later call [`Self::complete`].
    pub fn begin(&self, transaction_id: &str) -> Admission {
        let Ok(mut state) = self.state.lock() else {
            return Admission::Busy;
        };

        if state.in_flight {
            return Admission::Busy;
        }
        if state.submitted.contains(transaction_id) {
            return Admission::AlreadySubmitted;
        }

        state.in_flight = true;
        Admission::Proceed
    }

    /// Finish the in-flight submission.
    ///
    /// On success the id is kept so redelivery is skipped; on failure it is
    /// evicted so a legitimate retry can go through.
    pub fn complete(&self, transaction_id: &str, success: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight = false;
            if success {
                state.submitted.insert(transaction_id.to_string());
            } else {
                state.submitted.remove(transaction_id);
            }
        }
    }

    /// Whether a submission is currently in flight.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.state.lock().map(|s| s.in_flight).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_callback_during_flight_is_busy_regardless_of_id() {
        let guard = SubmissionGuard::new();
        assert_eq!(guard.begin("tx-1"), Admission::Proceed);
        assert_eq!(guard.begin("tx-1"), Admission::Busy);
        assert_eq!(guard.begin("tx-2"), Admission::Busy);

        guard.complete("tx-1", true);
        assert_eq!(guard.begin("tx-2"), Admission::Proceed);
    }

    #[test]
    fn successful_id_is_kept_for_the_session() {
        let guard = SubmissionGuard::new();
        assert_eq!(guard.begin("tx-1"), Admission::Proceed);
        guard.complete("tx-1", true);

        assert_eq!(guard.begin("tx-1"), Admission::AlreadySubmitted);
        // Still free to handle other transactions.
        assert_eq!(guard.begin("tx-2"), Admission::Proceed);
    }

    #[test]
    fn failed_id_is_evicted_to_allow_retry() {
        let guard = SubmissionGuard::new();
        assert_eq!(guard.begin("tx-1"), Admission::Proceed);
        guard.complete("tx-1", false);

        assert_eq!(guard.begin("tx-1"), Admission::Proceed);
        guard.complete("tx-1", true);
        assert_eq!(guard.begin("tx-1"), Admission::AlreadySubmitted);
    }
}
