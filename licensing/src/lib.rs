//! Licence state machine and enforcement (spec §4.5): offline RSA/JWT
//! token verification, periodic online re-validation, and a small
//! enforcement-mode gate the orchestrator consults before accepting
//! review submissions.

pub mod error;
pub mod keys;
pub mod online;
pub mod service;
pub mod state;
pub mod token;

pub use error::{Error, Result};
pub use keys::PublicKeyCache;
pub use online::{AlwaysValid, HttpValidator, OnlineOutcome, OnlineValidator};
pub use service::{EnforcementMode, LicenceDecision, LicenceService, ServiceConfig};
pub use state::{LicenceState, Status};
