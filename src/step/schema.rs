//! Per-step field schema and local validation.

use serde::Serialize;

use crate::error::ValidationError;
use crate::session::Fields;

/// Validation rule for a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    /// Non-empty after trimming.
    NonEmpty,
    /// A checkbox that must be ticked (`true`, `on`, `yes` or `1`).
    Accepted,
    /// One of a fixed set of values.
    OneOf(Vec<String>),
    /// The field holds a count that must be one of `lengths`; entries
    /// `{prefix}1..={prefix}{count}` must then all be non-empty.
    Sequence {
        prefix: String,
        lengths: Vec<usize>,
        incomplete: String,
    },
}

/// A named field with its rule and the error shown when the rule fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub rule: FieldRule,
    pub message: String,
}

/// Outcome of validating a form, recomputed on every field change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub first_error: Option<String>,
}

/// The fields a step collects, checked in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style).
    pub fn field(mut self, name: &str, rule: FieldRule, message: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            rule,
            message: message.to_string(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Pure validation; reports only the first failing field.
    pub fn validate(&self, form: &Fields) -> Validation {
        match self.check(form) {
            Ok(()) => Validation {
                valid: true,
                first_error: None,
            },
            Err(e) => Validation {
                valid: false,
                first_error: Some(e.message),
            },
        }
    }

    /// Like `validate`, but returns the failing field as an error.
    pub fn check(&self, form: &Fields) -> Result<(), ValidationError> {
        for declared in &self.fields {
            check_field(declared, form)?;
        }
        Ok(())
    }

    /// Trimmed values of the fields this schema declares. Anything else in
    /// the form is dropped.
    pub fn collect(&self, form: &Fields) -> Fields {
        let mut collected = Fields::new();
        for declared in &self.fields {
            let value = trimmed(form, &declared.name);
            if let FieldRule::Sequence { prefix, .. } = &declared.rule {
                if let Ok(count) = value.parse::<usize>() {
                    for i in 1..=count {
                        let name = format!("{prefix}{i}");
                        collected.insert(name.clone(), trimmed(form, &name).to_string());
                    }
                }
            }
            collected.insert(declared.name.clone(), value.to_string());
        }
        collected
    }
}

fn trimmed<'a>(form: &'a Fields, name: &str) -> &'a str {
    form.get(name).map(|v| v.trim()).unwrap_or("")
}

fn check_field(declared: &FieldSpec, form: &Fields) -> Result<(), ValidationError> {
    let value = trimmed(form, &declared.name);
    let fail = |message: &str| ValidationError {
        field: declared.name.clone(),
        message: message.to_string(),
    };

    match &declared.rule {
        FieldRule::NonEmpty if value.is_empty() => Err(fail(&declared.message)),
        FieldRule::Accepted if !matches!(value, "true" | "on" | "yes" | "1") => {
            Err(fail(&declared.message))
        }
        FieldRule::OneOf(options) if !options.iter().any(|o| o == value) => {
            Err(fail(&declared.message))
        }
        FieldRule::Sequence {
            prefix,
            lengths,
            incomplete,
        } => {
            let count = value
                .parse::<usize>()
                .ok()
                .filter(|n| lengths.contains(n))
                .ok_or_else(|| fail(&declared.message))?;
            let all_filled = (1..=count).all(|i| !trimmed(form, &format!("{prefix}{i}")).is_empty());
            if all_filled {
                Ok(())
            } else {
                Err(fail(incomplete))
            }
        }
        _ => Ok(()),
    }
}
