use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{Authenticator, DenialReason, Outcome};

/// Prompt text shown when no reason is configured.
pub const DEFAULT_REASON: &str = "Authenticate to access your secure data";

/// Platform side of a user-presence policy: a capability probe plus the prompt.
#[async_trait]
pub trait PresenceEvaluator: Send + Sync {
    /// Whether the policy can be evaluated at all on this device.
    fn can_evaluate(&self) -> Result<(), String>;

    /// Present the prompt; `Err` carries why the user did not pass.
    async fn evaluate(&self, reason: &str) -> Result<(), String>;
}

/// Authenticator that requires user presence through a `PresenceEvaluator`.
/// Device capability is re-probed on every call.
pub struct PolicyAuthenticator<E: PresenceEvaluator> {
    evaluator: E,
    reason: String,
}

impl<E: PresenceEvaluator> PolicyAuthenticator<E> {
    pub fn new(evaluator: E) -> Self {
        Self::with_reason(evaluator, DEFAULT_REASON)
    }

    pub fn with_reason(evaluator: E, reason: impl Into<String>) -> Self {
        Self {
            evaluator,
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl<E: PresenceEvaluator> Authenticator for PolicyAuthenticator<E> {
    #[instrument(skip_all)]
    async fn authenticate(&self) -> Outcome {
        if let Err(detail) = self.evaluator.can_evaluate() {
            debug!(%detail, "presence policy unavailable");
            return Outcome::Denied(DenialReason::Unavailable(detail));
        }

        match self.evaluator.evaluate(&self.reason).await {
            Ok(()) => Outcome::Granted,
            Err(detail) => Outcome::Denied(DenialReason::Rejected(detail)),
        }
    }
}
