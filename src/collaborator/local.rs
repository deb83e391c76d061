//! In-process collaborator used by the bundled server and for local runs.
//!
//! Never blocks a session, acknowledges every submission without keeping
//! the submitted values, and serves text from an optional JSON catalog of
//! the form `{"en": {"entry": {"title": "Welcome"}}}`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{Collaborator, SecurityCheck, SubmitResult, Translations};
use crate::error::{CollaboratorError, ConfigError};
use crate::session::Fields;

/// language → page → key → text
pub type Catalog = BTreeMap<String, BTreeMap<String, Translations>>;

pub struct LocalCollaborator {
    catalog: Catalog,
    instance: Uuid,
    submissions: AtomicU64,
}

impl LocalCollaborator {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            instance: Uuid::new_v4(),
            submissions: AtomicU64::new(0),
        }
    }

    /// Load the catalog from a JSON file.
    pub fn from_catalog_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            key: path.display().to_string(),
            message: e.to_string(),
        })?;
        let catalog = serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidValue {
            key: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(catalog))
    }

    /// Number of submissions acknowledged so far.
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }
}

impl Default for LocalCollaborator {
    fn default() -> Self {
        Self::new(Catalog::new())
    }
}

#[async_trait]
impl Collaborator for LocalCollaborator {
    fn is_ready(&self) -> bool {
        true
    }

    async fn check_security(&self, route_label: &str) -> Result<SecurityCheck, CollaboratorError> {
        info!(route = route_label, "Local verification check passed");
        Ok(SecurityCheck::default())
    }

    fn get_translations(&self, lang: &str, page: &str) -> Translations {
        self.catalog
            .get(lang)
            .and_then(|pages| pages.get(page))
            .cloned()
            .unwrap_or_default()
    }

    fn t(&self, lang: &str, page: &str, key: &str, fallback: &str) -> String {
        self.catalog
            .get(lang)
            .and_then(|pages| pages.get(page))
            .and_then(|texts| texts.get(key))
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    fn get_supported_languages(&self) -> Vec<String> {
        if self.catalog.is_empty() {
            vec!["en".to_string()]
        } else {
            self.catalog.keys().cloned().collect()
        }
    }

    async fn submit_form(&self, fields: &Fields) -> Result<SubmitResult, CollaboratorError> {
        let count = self.submissions.fetch_add(1, Ordering::Relaxed) + 1;
        info!(fields = fields.len(), submission = count, "Local submission acknowledged");
        Ok(SubmitResult {
            success: true,
            redirect: None,
            message: None,
        })
    }

    fn get_integrity_hash(&self) -> String {
        self.instance.simple().to_string()
    }

    fn generate_token(&self, purpose: &str) -> String {
        format!("{purpose}-{}", Uuid::new_v4().simple())
    }
}
