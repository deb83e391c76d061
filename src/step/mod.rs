//! Steps: static definitions, field schemas and the per-step controller.

pub mod controller;
pub mod definition;
pub mod schema;

pub use controller::{GENERIC_SUBMIT_ERROR, StepController, StepDeps, StepStatus, SubmitOutcome};
pub use definition::{StepDefinition, StepKind, WizardDefinition};
pub use schema::{FieldRule, FieldSchema, FieldSpec, Validation};
