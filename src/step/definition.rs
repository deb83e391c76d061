//! Static step configuration and the linear chain they form.

use std::collections::HashSet;

use serde::Serialize;

use super::schema::{FieldRule, FieldSchema};
use crate::error::ConfigError;
use crate::session::Stage;

/// How a step behaves once rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Collects fields and submits them.
    Form,
    /// Shows a waiting screen, then advances on its own.
    Interstitial,
    /// End of the wizard; accepts nothing.
    Terminal,
}

/// One step of the wizard.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub id: Stage,
    /// Translation page this step's text lives on.
    pub page: String,
    pub kind: StepKind,
    /// Stage that must have been reached before this step may render.
    pub required_prior_stage: Option<Stage>,
    pub schema: FieldSchema,
    pub next_stage: Option<Stage>,
}

impl StepDefinition {
    /// A form step. Non-entry steps require the entry step by default.
    pub fn form(id: Stage, page: &str, schema: FieldSchema, next: Stage) -> Self {
        Self {
            id,
            page: page.to_string(),
            kind: StepKind::Form,
            required_prior_stage: default_requirement(id),
            schema,
            next_stage: Some(next),
        }
    }

    pub fn interstitial(id: Stage, page: &str, next: Stage) -> Self {
        Self {
            id,
            page: page.to_string(),
            kind: StepKind::Interstitial,
            required_prior_stage: default_requirement(id),
            schema: FieldSchema::new(),
            next_stage: Some(next),
        }
    }

    pub fn terminal(id: Stage, page: &str) -> Self {
        Self {
            id,
            page: page.to_string(),
            kind: StepKind::Terminal,
            required_prior_stage: default_requirement(id),
            schema: FieldSchema::new(),
            next_stage: None,
        }
    }

    /// Override the stage that must precede this one.
    pub fn requires(mut self, stage: Stage) -> Self {
        self.required_prior_stage = Some(stage);
        self
    }
}

fn default_requirement(id: Stage) -> Option<Stage> {
    (id != Stage::Entry).then_some(Stage::Entry)
}

/// A validated, linear sequence of steps starting at `Stage::Entry`.
#[derive(Debug, Clone)]
pub struct WizardDefinition {
    steps: Vec<StepDefinition>,
}

impl WizardDefinition {
    /// Validate and build a definition.
    ///
    /// The steps must form a single chain from the entry step to exactly one
    /// terminal step, every `next_stage` must lie later in the progression
    /// (so the chain cannot cycle) and every step must be on the chain.
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self, ConfigError> {
        let invalid = |msg: String| ConfigError::InvalidDefinition(msg);

        let mut ids = HashSet::new();
        for step in &steps {
            if !ids.insert(step.id) {
                return Err(invalid(format!("duplicate step {}", step.id)));
            }
            match (step.kind, step.next_stage) {
                (StepKind::Terminal, Some(next)) => {
                    return Err(invalid(format!(
                        "terminal step {} points at {next}",
                        step.id
                    )));
                }
                (StepKind::Form | StepKind::Interstitial, None) => {
                    return Err(invalid(format!("step {} has no next stage", step.id)));
                }
                (_, Some(next)) if next <= step.id => {
                    return Err(invalid(format!(
                        "step {} moves backwards to {next}",
                        step.id
                    )));
                }
                _ => {}
            }
        }

        let terminals = steps
            .iter()
            .filter(|s| s.kind == StepKind::Terminal)
            .count();
        if terminals != 1 {
            return Err(invalid(format!(
                "expected exactly one terminal step, found {terminals}"
            )));
        }
        if steps
            .iter()
            .any(|s| s.kind == StepKind::Interstitial && !s.schema.is_empty())
        {
            return Err(invalid("interstitial steps cannot collect fields".into()));
        }

        let definition = Self { steps };
        let entry = definition
            .step(Stage::Entry)
            .ok_or_else(|| invalid("missing entry step".into()))?;
        if entry.required_prior_stage.is_some() {
            return Err(invalid("entry step cannot require a prior stage".into()));
        }

        let mut reached = vec![Stage::Entry];
        let mut current = entry;
        while let Some(next) = current.next_stage {
            current = definition
                .step(next)
                .ok_or_else(|| invalid(format!("step {} points at undefined {next}", current.id)))?;
            reached.push(current.id);
        }
        if reached.len() != definition.steps.len() {
            return Err(invalid("some steps are not reachable from the entry step".into()));
        }

        for step in &definition.steps {
            if let Some(required) = step.required_prior_stage {
                if required >= step.id || !reached.contains(&required) {
                    return Err(invalid(format!(
                        "step {} requires {required}, which does not precede it",
                        step.id
                    )));
                }
            }
        }

        Ok(definition)
    }

    /// The default four-step flow: accept terms, a short preparation
    /// screen, a details form, and the completion screen.
    pub fn standard() -> Self {
        let steps = vec![
            StepDefinition::form(
                Stage::Entry,
                "entry",
                FieldSchema::new().field(
                    "terms_accepted",
                    FieldRule::Accepted,
                    "Please accept the terms to continue",
                ),
                Stage::Intermediate1,
            ),
            StepDefinition::interstitial(Stage::Intermediate1, "preparing", Stage::Intermediate2),
            StepDefinition::form(
                Stage::Intermediate2,
                "details",
                FieldSchema::new()
                    .field("name", FieldRule::NonEmpty, "Please enter your name")
                    .field(
                        "plan",
                        FieldRule::OneOf(vec![
                            "basic".to_string(),
                            "standard".to_string(),
                            "premium".to_string(),
                        ]),
                        "Please choose a plan",
                    ),
                Stage::Terminal,
            ),
            StepDefinition::terminal(Stage::Terminal, "complete"),
        ];
        Self { steps }
    }

    pub fn step(&self, id: Stage) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }
}

impl Default for WizardDefinition {
    fn default() -> Self {
        Self::standard()
    }
}
