//! Top-level wizard: wires the session, gate, guard and translator
//! together and turns a requested path into the screen to show.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collaborator::CollaboratorLoader;
use crate::config::WizardConfig;
use crate::error::{GateError, StorageError};
use crate::gate::{GateOutcome, VerificationGate};
use crate::guard::{Location, Navigation, NavigationGuard, Route};
use crate::i18n::Translator;
use crate::session::{SessionPort, SessionStore, Stage};
use crate::step::{StepController, StepDeps, StepKind, WizardDefinition};

/// What the host should show for a requested path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Screen {
    /// The gate has not decided yet.
    Pending,
    /// The verification module is unavailable and the flow is closed.
    Unavailable { error: String },
    /// The session was blocked; only the alternate branch renders.
    Alternate {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Navigate elsewhere.
    Redirect { to: String, replace: bool },
    /// Render a step.
    Step {
        stage: Stage,
        kind: StepKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        degraded: bool,
    },
}

/// Session summary without any collected values.
#[derive(Debug, Clone, Serialize)]
pub struct WizardStatus {
    pub gate: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_error: Option<String>,
    pub stage: Stage,
    pub fields: Vec<String>,
    pub entry_visited: bool,
    pub started_at: String,
    pub language: String,
}

pub struct Wizard {
    config: WizardConfig,
    definition: Arc<WizardDefinition>,
    session: Arc<SessionStore>,
    guard: Arc<NavigationGuard>,
    gate: Arc<VerificationGate>,
    translator: Arc<Translator>,
}

impl Wizard {
    /// Load (or create) the session under the configured namespace and
    /// build the components around it.
    pub async fn new(
        config: WizardConfig,
        definition: WizardDefinition,
        port: Arc<dyn SessionPort>,
    ) -> crate::error::Result<Self> {
        let definition = Arc::new(definition);
        let session = SessionStore::load(Arc::clone(&port), &config.storage_namespace).await?;
        let guard = Arc::new(NavigationGuard::new(
            Arc::clone(&session),
            Arc::clone(&definition),
        ));
        let gate = Arc::new(VerificationGate::new(config.load_failure_policy));
        let translator = Arc::new(
            Translator::load(
                Arc::clone(&gate),
                port,
                Arc::clone(&definition),
                &config.default_language,
            )
            .await?,
        );

        Ok(Self {
            config,
            definition,
            session,
            guard,
            gate,
            translator,
        })
    }

    /// Wait for the collaborator and run the verification check for the
    /// route the flow was opened on. Runs at most once; later calls return
    /// the first outcome.
    pub async fn mount(&self, loader: CollaboratorLoader, path: &str) -> GateOutcome {
        if let Err(e) = self.gate.initialize(loader).await {
            debug!(error = %e, "Mounting without a ready verification module");
        }
        let label = Location::parse(path)
            .map(|location| location.route.label())
            .unwrap_or_else(|| Route::Stage(Stage::Entry).label());
        let outcome = self.gate.evaluate(label).await;
        info!(route = label, outcome = outcome.label(), "Wizard mounted");
        outcome
    }

    /// Decide what to show for `path[?token=..]`. A step that renders is
    /// recorded through the guard's transition action.
    pub async fn navigate(&self, path: &str) -> Screen {
        let degraded = match self.gate.outcome() {
            None => return Screen::Pending,
            Some(GateOutcome::Unavailable(e)) => {
                return Screen::Unavailable {
                    error: GateError::Unavailable(e.clone()).to_string(),
                };
            }
            Some(GateOutcome::Blocked(result)) => {
                return Screen::Alternate {
                    reason: result.reason.clone(),
                };
            }
            Some(outcome) => outcome.is_degraded(),
        };

        match self.guard.check(path).await {
            Navigation::Render(stage) => {
                if let Err(e) = self.guard.transition(stage).await {
                    warn!(stage = %stage, error = %e, "Failed to persist stage transition");
                }
                let kind = self
                    .definition
                    .step(stage)
                    .map(|step| step.kind)
                    .unwrap_or(StepKind::Form);
                Screen::Step {
                    stage,
                    kind,
                    token: Location::parse(path).and_then(|l| l.token),
                    degraded,
                }
            }
            Navigation::Redirect { to, replace } => Screen::Redirect {
                to: to.to_url(),
                replace,
            },
            // the alternate branch only exists for blocked sessions
            Navigation::Alternate => Screen::Redirect {
                to: Route::Stage(Stage::Entry).path().to_string(),
                replace: true,
            },
        }
    }

    /// Fresh controller for a step of this wizard.
    pub async fn step_controller(&self, stage: Stage) -> Option<StepController> {
        let step = self.definition.step(stage)?.clone();
        let deps = StepDeps {
            session: Arc::clone(&self.session),
            guard: Arc::clone(&self.guard),
            collaborator: self.gate.collaborator(),
            language: self.translator.language().await,
        };
        Some(StepController::new(step, deps, &self.config))
    }

    /// Clear the session. The gate outcome and language preference stay.
    pub async fn reset(&self) -> Result<(), StorageError> {
        self.session.reset().await
    }

    pub async fn status(&self) -> WizardStatus {
        let session = self.session.snapshot().await;
        let outcome = self.gate.outcome();
        WizardStatus {
            gate: outcome.map(GateOutcome::label),
            gate_error: outcome.and_then(GateOutcome::error).map(|e| e.to_string()),
            stage: session.stage,
            fields: session.fields.into_keys().collect(),
            entry_visited: session.entry_visited,
            started_at: session.started_at.to_rfc3339(),
            language: self.translator.language().await,
        }
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    pub fn definition(&self) -> &WizardDefinition {
        &self.definition
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn guard(&self) -> &Arc<NavigationGuard> {
        &self.guard
    }

    pub fn gate(&self) -> &Arc<VerificationGate> {
        &self.gate
    }

    pub fn translator(&self) -> &Arc<Translator> {
        &self.translator
    }
}
