//! Injectable licence check used by [`crate::Orchestrator::submit_review`]
//! (spec §4.1, §4.5).
//!
//! The real enforcement state machine lives in a separate licensing crate
//! not depended on here; this module only defines the narrow interface the
//! orchestrator needs, so it can be wired to either a live licence service
//! or a permissive default for tests and standalone runs.

/// Licence enforcement mode (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnforcementMode {
    /// No licence checks performed.
    Off,
    /// Missing/expired licence allows submission but flags a warning.
    #[default]
    Soft,
    /// Missing/expired licence blocks submission outright.
    Strict,
}

/// Result of a licence check against the current licence state.
#[derive(Debug, Clone, Default)]
pub struct LicenceDecision {
    pub blocked: bool,
    pub warning: bool,
    pub reason: Option<String>,
}

/// Current licence validity as last observed by the caller (spec §4.5
/// "periodic revalidation"). `Valid` is the only state that never warns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LicenceState {
    #[default]
    Valid,
    Expired,
    Missing,
}

/// Holds the last-known licence state and turns it into a decision given an
/// enforcement mode. A live deployment updates `state` from a background
/// poll against the licensing crate (via [`LicenceGate::set_state`], callable
/// through a shared `Arc<Orchestrator<_>>` since the state is behind a
/// lock); tests can set it directly through the same seam.
#[derive(Debug, Default)]
pub struct LicenceGate {
    state: std::sync::RwLock<LicenceState>,
}

impl LicenceGate {
    pub fn new(state: LicenceState) -> Self {
        Self { state: std::sync::RwLock::new(state) }
    }

    /// Always-valid gate, for runs with no licensing enforcement wired in.
    pub fn permissive() -> Self {
        Self::new(LicenceState::Valid)
    }

    pub fn set_state(&self, state: LicenceState) {
        *self.state.write().unwrap() = state;
    }

    pub fn check(&self, mode: EnforcementMode) -> LicenceDecision {
        let state = *self.state.read().unwrap();
        match (mode, state) {
            (EnforcementMode::Off, _) | (_, LicenceState::Valid) => LicenceDecision::default(),
            (EnforcementMode::Soft, LicenceState::Expired) => LicenceDecision {
                blocked: false,
                warning: true,
                reason: Some("licence expired".into()),
            },
            (EnforcementMode::Soft, LicenceState::Missing) => LicenceDecision {
                blocked: false,
                warning: true,
                reason: Some("no licence configured".into()),
            },
            (EnforcementMode::Strict, LicenceState::Expired) => LicenceDecision {
                blocked: true,
                warning: false,
                reason: Some("licence expired".into()),
            },
            (EnforcementMode::Strict, LicenceState::Missing) => LicenceDecision {
                blocked: true,
                warning: false,
                reason: Some("no licence configured".into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_mode_warns_but_allows() {
        let gate = LicenceGate::new(LicenceState::Expired);
        let d = gate.check(EnforcementMode::Soft);
        assert!(!d.blocked);
        assert!(d.warning);
    }

    #[test]
    fn strict_mode_blocks_missing_licence() {
        let gate = LicenceGate::new(LicenceState::Missing);
        let d = gate.check(EnforcementMode::Strict);
        assert!(d.blocked);
    }

    #[test]
    fn off_mode_never_blocks() {
        let gate = LicenceGate::new(LicenceState::Missing);
        let d = gate.check(EnforcementMode::Off);
        assert!(!d.blocked);
        assert!(!d.warning);
    }
}
