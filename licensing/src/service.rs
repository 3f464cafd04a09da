//! Licence service: owns the single-row licence state behind a mutex
//! (spec §5 "Licence state: single-row table protected by the licence
//! service mutex") and runs the periodic validation sweep (spec §4.5).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::keys::PublicKeyCache;
use crate::online::{OnlineOutcome, OnlineValidator};
use crate::state::{LicenceState, Status};
use crate::token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnforcementMode {
    Off,
    #[default]
    Soft,
    Strict,
}

#[derive(Debug, Clone, Default)]
pub struct LicenceDecision {
    pub blocked: bool,
    pub warning: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub validation_interval: StdDuration,
    pub grace_days: i64,
}

impl ServiceConfig {
    /// Floors `validation_interval` at one minute (spec §4.5 "floor 1
    /// minute").
    pub fn new(validation_interval: StdDuration, grace_days: i64) -> Self {
        let floor = StdDuration::from_secs(60);
        Self {
            validation_interval: validation_interval.max(floor),
            grace_days,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new(StdDuration::from_secs(3600), 7)
    }
}

pub struct LicenceService<V: OnlineValidator> {
    state: Mutex<LicenceState>,
    keys: PublicKeyCache,
    online: V,
    config: ServiceConfig,
}

impl<V: OnlineValidator> LicenceService<V> {
    pub fn new(keys: PublicKeyCache, online: V, config: ServiceConfig) -> Self {
        Self { state: Mutex::new(LicenceState::default()), keys, online, config }
    }

    pub async fn snapshot(&self) -> LicenceState {
        self.state.lock().await.clone()
    }

    /// `missing → active` on a successful offline verification (spec
    /// §4.5).
    pub async fn enter_license(&self, raw_token: &str) -> Result<LicenceState> {
        let verified = token::verify(raw_token, &self.keys).await?;
        let now = Utc::now();
        let mut guard = self.state.lock().await;
        guard.activate(
            verified.kid,
            verified.claims.sub,
            verified.claims.seat_count,
            verified.claims.unlimited,
            chrono::DateTime::from_timestamp(verified.claims.exp, 0).unwrap_or(now),
            raw_token.to_string(),
            now,
        );
        Ok(guard.clone())
    }

    /// One periodic validation pass: offline check first, then an online
    /// check if the offline check passed (spec §4.5).
    pub async fn run_validation_cycle(&self) -> Result<LicenceState> {
        let now = Utc::now();
        let token_snapshot = {
            let guard = self.state.lock().await;
            guard.token.clone()
        };

        let Some(raw_token) = token_snapshot else {
            return Ok(self.state.lock().await.clone());
        };

        match token::verify(&raw_token, &self.keys).await {
            Ok(_) => match self.online.validate(&raw_token).await {
                Ok(OnlineOutcome::Valid) => {
                    let mut guard = self.state.lock().await;
                    guard.record_success(now);
                    info!("licence revalidated");
                    Ok(guard.clone())
                }
                Ok(OnlineOutcome::Rejected) => {
                    let mut guard = self.state.lock().await;
                    guard.record_semantic_failure(false, now);
                    warn!("licence rejected by online validator");
                    Ok(guard.clone())
                }
                Err(e) => {
                    let mut guard = self.state.lock().await;
                    guard.record_network_failure(now);
                    guard.sweep_grace_expiry(now, self.config.grace_days);
                    warn!(error = %e, "licence online validation failed, counted as network error");
                    Ok(guard.clone())
                }
            },
            Err(Error::Expired) => {
                let mut guard = self.state.lock().await;
                guard.record_semantic_failure(true, now);
                Ok(guard.clone())
            }
            Err(_) => {
                let mut guard = self.state.lock().await;
                guard.record_semantic_failure(false, now);
                Ok(guard.clone())
            }
        }
    }

    /// Spawns the periodic validation sweep as a background task, per
    /// `config.validation_interval` (spec §4.5, §10.4's
    /// `LICENSE_VALIDATION_INTERVAL_SECS`).
    pub fn spawn_scheduler(self: &Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        V: 'static,
    {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.config.validation_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = service.run_validation_cycle().await {
                    warn!(error = %e, "licence validation cycle failed");
                }
            }
        })
    }

    pub fn check(&self, mode: EnforcementMode, state: &LicenceState) -> LicenceDecision {
        match mode {
            EnforcementMode::Off => LicenceDecision::default(),
            EnforcementMode::Soft => match state.status {
                Status::Active => LicenceDecision::default(),
                other => LicenceDecision {
                    blocked: false,
                    warning: true,
                    reason: Some(format!("licence status is {other:?}")),
                },
            },
            EnforcementMode::Strict => match state.status {
                Status::Active => LicenceDecision::default(),
                other => LicenceDecision {
                    blocked: true,
                    warning: false,
                    reason: Some(format!("licence status is {other:?}")),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::online::AlwaysValid;

    fn service() -> LicenceService<AlwaysValid> {
        LicenceService::new(PublicKeyCache::new(), AlwaysValid, ServiceConfig::default())
    }

    #[test]
    fn interval_is_floored_at_one_minute() {
        let cfg = ServiceConfig::new(StdDuration::from_secs(5), 7);
        assert_eq!(cfg.validation_interval, StdDuration::from_secs(60));
    }

    #[tokio::test]
    async fn strict_mode_blocks_without_active_status() {
        let svc = service();
        let state = LicenceState::default();
        let decision = svc.check(EnforcementMode::Strict, &state);
        assert!(decision.blocked);
    }

    #[tokio::test]
    async fn soft_mode_warns_but_never_blocks() {
        let svc = service();
        let state = LicenceState::default();
        let decision = svc.check(EnforcementMode::Soft, &state);
        assert!(!decision.blocked);
        assert!(decision.warning);
    }

    #[tokio::test]
    async fn validation_cycle_is_a_noop_without_a_token() {
        let svc = service();
        let state = svc.run_validation_cycle().await.unwrap();
        assert_eq!(state.status, Status::Missing);
    }
}
