//! Navigation guard: decides whether a requested route may render and
//! owns the transition action that records stage progress.
//!
//! The guard only stops a session from skipping ahead of the entry step
//! (or of a step's declared prerequisite). Revisiting earlier steps is
//! always allowed.

pub mod route;

use std::sync::Arc;

use tracing::debug;

use crate::error::StorageError;
use crate::session::{SessionStore, Stage};
use crate::step::WizardDefinition;

pub use route::{Location, Route, TOKEN_PARAM};

/// Guard decision for a requested route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// The step may render.
    Render(Stage),
    /// Go somewhere else; `replace` means the current history entry is
    /// replaced so back-navigation cannot loop.
    Redirect { to: Location, replace: bool },
    /// The alternate branch was requested.
    Alternate,
}

pub struct NavigationGuard {
    session: Arc<SessionStore>,
    definition: Arc<WizardDefinition>,
}

impl NavigationGuard {
    pub fn new(session: Arc<SessionStore>, definition: Arc<WizardDefinition>) -> Self {
        Self {
            session,
            definition,
        }
    }

    /// Check a requested `path[?query]` against the session.
    pub async fn check(&self, path: &str) -> Navigation {
        let Some(location) = Location::parse(path) else {
            debug!(path, "Unknown route, redirecting to entry");
            return to_entry();
        };

        let stage = match location.route {
            Route::Blocked => return Navigation::Alternate,
            Route::Stage(stage) => stage,
        };
        let Some(step) = self.definition.step(stage) else {
            debug!(stage = %stage, "Stage not part of this wizard, redirecting to entry");
            return to_entry();
        };

        let allowed = match step.required_prior_stage {
            None => true,
            Some(Stage::Entry) => self.session.entry_visited().await,
            Some(required) => {
                self.session.entry_visited().await && self.session.stage().await >= required
            }
        };

        if allowed {
            Navigation::Render(stage)
        } else {
            debug!(stage = %stage, "Stage requested before its prerequisite, redirecting to entry");
            to_entry()
        }
    }

    /// Transition action: record that `stage` has been reached. Rendering
    /// the entry step also marks it visited.
    ///
    /// This is the only writer of `stage` and `entry_visited`.
    pub async fn transition(&self, stage: Stage) -> Result<(), StorageError> {
        self.session
            .apply_transition(stage, stage == Stage::Entry)
            .await
    }
}

fn to_entry() -> Navigation {
    Navigation::Redirect {
        to: Location::new(Route::Stage(Stage::Entry)),
        replace: true,
    }
}
