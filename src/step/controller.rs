//! Step controller: one instance per mounted step.
//!
//! Submission order is fixed: validate, take the in-flight flag, merge the
//! collected fields into the session, hold the loading state for the pacing
//! delay, dispatch to the collaborator, then advance or surface the error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::definition::{StepDefinition, StepKind};
use super::schema::Validation;
use crate::collaborator::Collaborator;
use crate::config::WizardConfig;
use crate::error::{SubmissionError, ValidationError};
use crate::guard::{Location, NavigationGuard, Route};
use crate::session::{Fields, SessionStore, Stage};
use crate::token::navigation_token;

/// Shown when the collaborator gives no usable message.
pub const GENERIC_SUBMIT_ERROR: &str = "Failed to submit. Please try again.";

/// What the step's view renders from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub loading: bool,
    pub error: Option<String>,
}

/// Result of a `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stage advanced; navigate here, replacing history.
    Advanced(Location),
    /// Local validation failed; nothing was sent.
    Invalid(ValidationError),
    /// The collaborator rejected the submission or the call failed.
    Failed(SubmissionError),
    /// Another submission from this instance is still running.
    InFlight,
    /// The step was unmounted before the submission finished.
    Detached,
}

/// Collaborators a step controller needs.
#[derive(Clone)]
pub struct StepDeps {
    pub session: Arc<SessionStore>,
    pub guard: Arc<NavigationGuard>,
    /// `None` when the flow runs degraded without a verification module.
    pub collaborator: Option<Arc<dyn Collaborator>>,
    pub language: String,
}

/// Holds the in-flight flag for the duration of one submission and clears
/// it on every exit path.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(Arc::clone(flag)))
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct StepController {
    step: StepDefinition,
    deps: StepDeps,
    pacing_delay: Duration,
    error_dismiss_after: Duration,
    interstitial_dwell: Duration,
    in_flight: Arc<AtomicBool>,
    mounted: Arc<AtomicBool>,
    status: Arc<watch::Sender<StepStatus>>,
    dismiss_timer: Mutex<Option<JoinHandle<()>>>,
    dwell_timer: Mutex<Option<JoinHandle<()>>>,
}

impl StepController {
    pub fn new(step: StepDefinition, deps: StepDeps, config: &WizardConfig) -> Self {
        let (status, _) = watch::channel(StepStatus::default());
        Self {
            step,
            deps,
            pacing_delay: config.pacing_delay,
            error_dismiss_after: config.error_dismiss_after,
            interstitial_dwell: config.interstitial_dwell,
            in_flight: Arc::new(AtomicBool::new(false)),
            mounted: Arc::new(AtomicBool::new(true)),
            status: Arc::new(status),
            dismiss_timer: Mutex::new(None),
            dwell_timer: Mutex::new(None),
        }
    }

    pub fn stage(&self) -> Stage {
        self.step.id
    }

    pub fn definition(&self) -> &StepDefinition {
        &self.step
    }

    /// Current view state.
    pub fn status(&self) -> StepStatus {
        self.status.borrow().clone()
    }

    /// Follow view state changes.
    pub fn subscribe(&self) -> watch::Receiver<StepStatus> {
        self.status.subscribe()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Validate the current form against the step schema. Pure.
    pub fn validate(&self, form: &Fields) -> Validation {
        self.step.schema.validate(form)
    }

    /// Submit the form. See the module docs for the sequence.
    pub async fn submit(&self, form: &Fields) -> SubmitOutcome {
        if self.step.kind != StepKind::Form {
            return SubmitOutcome::Failed(SubmissionError::Rejected {
                message: format!("step {} does not accept submissions", self.step.id),
            });
        }

        if let Err(error) = self.step.schema.check(form) {
            debug!(stage = %self.step.id, field = %error.field, "Submission failed local validation");
            self.show_error(error.message.clone());
            return SubmitOutcome::Invalid(error);
        }

        let Some(_in_flight) = InFlightGuard::acquire(&self.in_flight) else {
            debug!(stage = %self.step.id, "Submission already in flight, ignoring");
            return SubmitOutcome::InFlight;
        };

        let collected = self.step.schema.collect(form);
        if let Err(e) = self.deps.session.merge_fields(&collected).await {
            warn!(stage = %self.step.id, error = %e, "Failed to persist step fields");
        }

        self.cancel_dismiss();
        self.publish(|s| {
            s.loading = true;
            s.error = None;
        });

        tokio::time::sleep(self.pacing_delay).await;
        let result = self.dispatch().await;

        if !self.is_mounted() {
            info!(stage = %self.step.id, "Submission finished after unmount, discarding result");
            return SubmitOutcome::Detached;
        }

        match result {
            Ok(()) => {
                let location = self.advance().await;
                self.publish(|s| s.loading = false);
                SubmitOutcome::Advanced(location)
            }
            Err(e) => {
                warn!(stage = %self.step.id, error = %e, "Submission not accepted");
                self.publish(|s| s.loading = false);
                self.show_error(e.message().to_string());
                SubmitOutcome::Failed(e)
            }
        }
    }

    /// Start the dwell timer of an interstitial step. The receiver yields
    /// the next location once the stage has advanced, or errors if the step
    /// was unmounted first.
    pub fn begin_interstitial(&self) -> Option<oneshot::Receiver<Location>> {
        if self.step.kind != StepKind::Interstitial {
            return None;
        }
        let next = self.step.next_stage?;
        let (tx, rx) = oneshot::channel();
        let guard = Arc::clone(&self.deps.guard);
        let mounted = Arc::clone(&self.mounted);
        let dwell = self.interstitial_dwell;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(dwell).await;
            if !mounted.load(Ordering::SeqCst) {
                return;
            }
            if let Err(e) = guard.transition(next).await {
                warn!(stage = %next, error = %e, "Failed to persist stage transition");
            }
            let _ = tx.send(next_location(next));
        });
        replace_timer(&self.dwell_timer, Some(handle));
        Some(rx)
    }

    /// Tear down: stop timers, drop the in-flight flag, and ignore any
    /// result that arrives later.
    pub fn unmount(&self) {
        if self.mounted.swap(false, Ordering::SeqCst) {
            debug!(stage = %self.step.id, "Step unmounted");
        }
        replace_timer(&self.dismiss_timer, None);
        replace_timer(&self.dwell_timer, None);
        self.in_flight.store(false, Ordering::SeqCst);
    }

    async fn dispatch(&self) -> Result<(), SubmissionError> {
        let Some(collaborator) = &self.deps.collaborator else {
            return Err(SubmissionError::Failed {
                message: "Verification module unavailable".to_string(),
            });
        };

        let mut envelope = self.deps.session.fields().await;
        envelope.insert("language".to_string(), self.deps.language.clone());
        envelope.insert("_integrity".to_string(), collaborator.get_integrity_hash());
        envelope.insert("_token".to_string(), collaborator.generate_token("submit"));

        match collaborator.submit_form(&envelope).await {
            Ok(result) if result.success => {
                info!(stage = %self.step.id, fields = envelope.len(), "Submission accepted");
                Ok(())
            }
            Ok(result) => Err(SubmissionError::Rejected {
                message: result
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_SUBMIT_ERROR.to_string()),
            }),
            Err(e) => {
                let message = e.to_string();
                Err(SubmissionError::Failed {
                    message: if message.trim().is_empty() {
                        GENERIC_SUBMIT_ERROR.to_string()
                    } else {
                        message
                    },
                })
            }
        }
    }

    async fn advance(&self) -> Location {
        let Some(next) = self.step.next_stage else {
            return Location::new(Route::Stage(self.step.id));
        };
        if let Err(e) = self.deps.guard.transition(next).await {
            warn!(stage = %next, error = %e, "Failed to persist stage transition");
        }
        next_location(next)
    }

    fn publish(&self, update: impl FnOnce(&mut StepStatus)) {
        if self.is_mounted() {
            self.status.send_modify(update);
        }
    }

    /// Show a step-scoped error and schedule its dismissal.
    fn show_error(&self, message: String) {
        if !self.is_mounted() {
            return;
        }
        self.status.send_modify(|s| s.error = Some(message.clone()));

        let status = Arc::clone(&self.status);
        let mounted = Arc::clone(&self.mounted);
        let after = self.error_dismiss_after;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if mounted.load(Ordering::SeqCst) {
                status.send_modify(|s| {
                    if s.error.as_deref() == Some(message.as_str()) {
                        s.error = None;
                    }
                });
            }
        });
        replace_timer(&self.dismiss_timer, Some(handle));
    }

    fn cancel_dismiss(&self) {
        replace_timer(&self.dismiss_timer, None);
    }
}

impl Drop for StepController {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn next_location(stage: Stage) -> Location {
    Location::new(Route::Stage(stage)).with_token(navigation_token(Utc::now()))
}

fn replace_timer(slot: &Mutex<Option<JoinHandle<()>>>, handle: Option<JoinHandle<()>>) {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = std::mem::replace(&mut *slot, handle) {
        previous.abort();
    }
}
