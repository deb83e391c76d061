//! Verification gate: waits for the collaborator once, asks it once whether
//! the session may proceed, and remembers the answer.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::collaborator::{Collaborator, CollaboratorLoader};
pub use crate::config::LoadFailurePolicy;
use crate::error::{CollaboratorError, GateError};

/// Normalized answer of the verification check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Which branch the flow mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Verified and allowed.
    Open(VerificationResult),
    /// Verified and diverted to the alternate branch.
    Blocked(VerificationResult),
    /// The module never became usable; the flow stays closed.
    Unavailable(CollaboratorError),
    /// The module never became usable but the policy lets the flow run
    /// without it.
    Degraded(CollaboratorError),
}

impl GateOutcome {
    /// Whether the main flow may render.
    pub fn allows_flow(&self) -> bool {
        matches!(self, Self::Open(_) | Self::Degraded(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    /// The error the flow surfaces, if any.
    pub fn error(&self) -> Option<GateError> {
        match self {
            Self::Open(_) | Self::Degraded(_) => None,
            Self::Blocked(result) => Some(GateError::Blocked {
                reason: result.reason.clone(),
            }),
            Self::Unavailable(e) => Some(GateError::Unavailable(e.clone())),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Blocked(_) => "blocked",
            Self::Unavailable(_) => "unavailable",
            Self::Degraded(_) => "degraded",
        }
    }
}

type Readiness = Result<Arc<dyn Collaborator>, CollaboratorError>;

pub struct VerificationGate {
    policy: LoadFailurePolicy,
    readiness: OnceCell<Readiness>,
    outcome: OnceCell<GateOutcome>,
}

impl VerificationGate {
    pub fn new(policy: LoadFailurePolicy) -> Self {
        Self {
            policy,
            readiness: OnceCell::new(),
            outcome: OnceCell::new(),
        }
    }

    /// Wait for the collaborator. Only the first loader handed in is used;
    /// later calls return the stored readiness.
    pub async fn initialize(&self, loader: CollaboratorLoader) -> Result<(), CollaboratorError> {
        self.readiness
            .get_or_init(|| loader.await_ready())
            .await
            .as_ref()
            .map(|_| ())
            .map_err(Clone::clone)
    }

    /// Run the verification check for `route_label` and cache the outcome.
    ///
    /// A collaborator that throws blocks the session with the error message
    /// as the reason. Readiness failures follow the load failure policy.
    pub async fn evaluate(&self, route_label: &str) -> GateOutcome {
        self.outcome
            .get_or_init(|| self.run(route_label))
            .await
            .clone()
    }

    /// The cached outcome, if `evaluate` has completed.
    pub fn outcome(&self) -> Option<&GateOutcome> {
        self.outcome.get()
    }

    /// The ready collaborator, if there is one.
    pub fn collaborator(&self) -> Option<Arc<dyn Collaborator>> {
        match self.readiness.get() {
            Some(Ok(collaborator)) => Some(Arc::clone(collaborator)),
            _ => None,
        }
    }

    pub fn policy(&self) -> LoadFailurePolicy {
        self.policy
    }

    async fn run(&self, route_label: &str) -> GateOutcome {
        let collaborator = match self.readiness.get() {
            Some(Ok(collaborator)) => Arc::clone(collaborator),
            Some(Err(e)) => return self.on_load_failure(e.clone()),
            None => {
                return self.on_load_failure(CollaboratorError::LoadFailed {
                    reason: "gate evaluated before initialization".to_string(),
                });
            }
        };

        match collaborator.check_security(route_label).await {
            Ok(check) if check.blocked => {
                info!(route = route_label, reason = ?check.reason, "Session blocked by verification");
                GateOutcome::Blocked(VerificationResult {
                    blocked: true,
                    reason: check.reason,
                })
            }
            Ok(check) => {
                info!(route = route_label, "Session verified");
                GateOutcome::Open(VerificationResult {
                    blocked: false,
                    reason: check.reason,
                })
            }
            Err(e) => {
                warn!(route = route_label, error = %e, "Verification check failed, blocking session");
                GateOutcome::Blocked(VerificationResult {
                    blocked: true,
                    reason: Some(e.to_string()),
                })
            }
        }
    }

    fn on_load_failure(&self, error: CollaboratorError) -> GateOutcome {
        match self.policy {
            LoadFailurePolicy::FailClosed => {
                warn!(error = %error, "Verification module unavailable, flow closed");
                GateOutcome::Unavailable(error)
            }
            LoadFailurePolicy::FailOpen => {
                warn!(error = %error, "Verification module unavailable, continuing without it");
                GateOutcome::Degraded(error)
            }
        }
    }
}
