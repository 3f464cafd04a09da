//! Licence state machine (spec §3 `LicenceState`, §4.5 transitions).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Missing,
    Active,
    Warning,
    Grace,
    Expired,
    Invalid,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Expired | Status::Invalid)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LicenceState {
    pub token: Option<String>,
    pub kid: Option<String>,
    pub subject: Option<String>,
    pub seat_count: Option<u32>,
    pub unlimited: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub validation_failures: u32,
    pub status: Status,
    pub grace_started_at: Option<DateTime<Utc>>,
}

impl Default for Status {
    fn default() -> Self {
        Status::Missing
    }
}

impl LicenceState {
    /// Applies a freshly offline-verified token (spec §4.5
    /// `missing → active`).
    pub fn activate(&mut self, kid: String, subject: String, seat_count: Option<u32>, unlimited: bool, expires_at: DateTime<Utc>, token: String, now: DateTime<Utc>) {
        self.token = Some(token);
        self.kid = Some(kid);
        self.subject = Some(subject);
        self.seat_count = seat_count;
        self.unlimited = unlimited;
        self.expires_at = Some(expires_at);
        self.last_validated_at = Some(now);
        self.validation_failures = 0;
        self.status = Status::Active;
        self.grace_started_at = None;
    }

    /// A periodic validation succeeded online: resets the failure streak
    /// and keeps `active` (spec §4.5 "success resets `validation_failures`
    /// to 0 and keeps active").
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.validation_failures = 0;
        self.last_validated_at = Some(now);
        self.status = Status::Active;
        self.grace_started_at = None;
    }

    /// A periodic validation hit a network error: escalates
    /// `active → warning → grace` (spec §4.5).
    pub fn record_network_failure(&mut self, now: DateTime<Utc>) {
        self.validation_failures += 1;
        self.last_validated_at = Some(now);
        self.status = match self.status {
            Status::Active => Status::Warning,
            Status::Warning => {
                self.grace_started_at = Some(now);
                Status::Grace
            }
            other => other,
        };
    }

    /// A scheduled sweep promotes `grace → expired` once the grace period
    /// has elapsed (spec §4.5).
    pub fn sweep_grace_expiry(&mut self, now: DateTime<Utc>, grace_days: i64) {
        if self.status != Status::Grace {
            return;
        }
        if let Some(started) = self.grace_started_at {
            if (now - started).num_days() > grace_days {
                self.status = Status::Expired;
            }
        }
    }

    /// A semantic validation failure: `exp` in the past marks `expired`,
    /// a signature/kid mismatch marks `invalid`. Both are terminal until a
    /// new token is entered (spec §4.5).
    pub fn record_semantic_failure(&mut self, expired: bool, now: DateTime<Utc>) {
        self.last_validated_at = Some(now);
        self.status = if expired { Status::Expired } else { Status::Invalid };
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|exp| (exp - now).num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn network_failures_escalate_active_warning_grace() {
        let mut state = LicenceState { status: Status::Active, ..Default::default() };
        let t0 = Utc::now();
        state.record_network_failure(t0);
        assert_eq!(state.status, Status::Warning);
        state.record_network_failure(t0);
        assert_eq!(state.status, Status::Grace);
        assert_eq!(state.grace_started_at, Some(t0));
    }

    #[test]
    fn grace_sweeps_to_expired_after_grace_days() {
        let mut state = LicenceState::default();
        let t0 = Utc::now();
        state.status = Status::Grace;
        state.grace_started_at = Some(t0);
        state.sweep_grace_expiry(t0 + Duration::days(3), 7);
        assert_eq!(state.status, Status::Grace);
        state.sweep_grace_expiry(t0 + Duration::days(8), 7);
        assert_eq!(state.status, Status::Expired);
    }

    #[test]
    fn success_resets_failures_and_grace() {
        let mut state = LicenceState {
            status: Status::Grace,
            validation_failures: 2,
            grace_started_at: Some(Utc::now()),
            ..Default::default()
        };
        state.record_success(Utc::now());
        assert_eq!(state.status, Status::Active);
        assert_eq!(state.validation_failures, 0);
        assert!(state.grace_started_at.is_none());
    }
}
