//! External verification module: the collaborator that supplies
//! verification, text lookup and submission.
//!
//! The engine never implements these operations itself. It waits for a
//! collaborator to become ready (see [`loader`]) and then calls it through
//! the [`Collaborator`] trait.

pub mod loader;
pub mod local;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::session::Fields;

pub use loader::{CollaboratorLoader, LoadHandle, LoadSignal};
pub use local::LocalCollaborator;

/// Answer to a `check_security` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityCheck {
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Answer to a `submit_form` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Page of translated strings, keyed by text id.
pub type Translations = BTreeMap<String, String>;

/// The external module's contract.
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Synchronous readiness check.
    fn is_ready(&self) -> bool;

    /// Decide whether the session should be diverted to the alternate branch.
    async fn check_security(&self, route_label: &str) -> Result<SecurityCheck, CollaboratorError>;

    /// All strings for one page in one language.
    fn get_translations(&self, lang: &str, page: &str) -> Translations;

    /// Single string lookup; returns `fallback` when the key is absent.
    fn t(&self, lang: &str, page: &str, key: &str, fallback: &str) -> String;

    /// Language codes the module has catalogs for.
    fn get_supported_languages(&self) -> Vec<String>;

    /// Submit the collected fields.
    async fn submit_form(&self, fields: &Fields) -> Result<SubmitResult, CollaboratorError>;

    /// Opaque integrity value attached to every submission.
    fn get_integrity_hash(&self) -> String;

    /// Opaque token for the given purpose.
    fn generate_token(&self, purpose: &str) -> String;
}
