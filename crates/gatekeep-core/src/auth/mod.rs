//! User-presence gate: the `Authenticator` contract, its outcomes, and the
//! capability token a successful check hands to a gated backend.

mod policy;

use std::{
    fmt,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;

pub use policy::{PolicyAuthenticator, PresenceEvaluator, DEFAULT_REASON};

/// Why a user-presence check did not grant access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The policy cannot be satisfied on this device (e.g. nothing enrolled).
    Unavailable(String),
    /// The user failed or cancelled the check.
    Rejected(String),
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(detail) => write!(f, "policy not satisfiable: {detail}"),
            Self::Rejected(detail) => write!(f, "user check failed: {detail}"),
        }
    }
}

/// Result of a single authentication attempt. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Granted,
    Denied(DenialReason),
}

/// Performs a user-presence check.
///
/// Implementations must not carry state between calls and must report any
/// failure to evaluate the policy as `Outcome::Denied`.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self) -> Outcome;
}

/// One-shot proof that a user-presence check succeeded.
///
/// Only the gated backend can mint one, and each is spent on exactly one
/// storage operation.
#[derive(Debug)]
pub struct Grant {
    _private: (),
}

impl Grant {
    pub(crate) fn mint() -> Self {
        Self { _private: () }
    }
}

/// Authenticator with a switchable answer, for tests and smoke runs.
/// Counts every check so callers can assert the gate ran exactly once.
#[derive(Debug)]
pub struct StaticAuthenticator {
    granted: AtomicBool,
    calls: AtomicUsize,
}

impl StaticAuthenticator {
    pub fn granting() -> Self {
        Self::new(true)
    }

    pub fn denying() -> Self {
        Self::new(false)
    }

    fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// Number of checks performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.granted.load(Ordering::SeqCst) {
            Outcome::Granted
        } else {
            Outcome::Denied(DenialReason::Rejected("denied by static authenticator".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_authenticator_flips_and_counts() {
        let auth = StaticAuthenticator::granting();
        assert_eq!(auth.authenticate().await, Outcome::Granted);

        auth.set_granted(false);
        assert!(matches!(
            auth.authenticate().await,
            Outcome::Denied(DenialReason::Rejected(_))
        ));
        assert_eq!(auth.calls(), 2);
    }

    #[test]
    fn denial_reason_display_names_the_cause() {
        let unavailable = DenialReason::Unavailable("no biometrics enrolled".into());
        assert_eq!(
            unavailable.to_string(),
            "policy not satisfiable: no biometrics enrolled"
        );
        let rejected = DenialReason::Rejected("cancelled".into());
        assert_eq!(rejected.to_string(), "user check failed: cancelled");
    }
}
