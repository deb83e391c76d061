//! Text lookup on top of the collaborator's catalogs, with a persisted
//! language preference.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::collaborator::Translations;
use crate::error::StorageError;
use crate::gate::VerificationGate;
use crate::session::{SessionPort, Stage};
use crate::step::WizardDefinition;

/// Key prefix of language display names on the entry page.
const LANGUAGE_OPTION_PREFIX: &str = "language_option.";

/// Storage key of the language preference. Lives outside the wizard
/// namespace so a session reset keeps it.
pub const LANGUAGE_KEY: &str = "language";

pub struct Translator {
    gate: Arc<VerificationGate>,
    port: Arc<dyn SessionPort>,
    definition: Arc<WizardDefinition>,
    language: RwLock<String>,
}

impl Translator {
    /// Restore the stored preference, or start with `default_language`.
    pub async fn load(
        gate: Arc<VerificationGate>,
        port: Arc<dyn SessionPort>,
        definition: Arc<WizardDefinition>,
        default_language: &str,
    ) -> Result<Self, StorageError> {
        let language = port
            .read(LANGUAGE_KEY)
            .await?
            .filter(|lang| !lang.trim().is_empty())
            .unwrap_or_else(|| default_language.to_string());
        debug!(language = %language, "Language selected");
        Ok(Self {
            gate,
            port,
            definition,
            language: RwLock::new(language),
        })
    }

    pub async fn language(&self) -> String {
        self.language.read().await.clone()
    }

    /// Languages the collaborator has catalogs for. Only the current
    /// language while no collaborator is ready.
    pub async fn supported_languages(&self) -> Vec<String> {
        match self.gate.collaborator() {
            Some(collaborator) => collaborator.get_supported_languages(),
            None => vec![self.language().await],
        }
    }

    /// Switch language. Returns `false`, changing nothing, when the language
    /// is not supported.
    pub async fn change_language(&self, lang: &str) -> Result<bool, StorageError> {
        if !self.supported_languages().await.iter().any(|l| l == lang) {
            warn!(language = lang, "Unsupported language requested");
            return Ok(false);
        }
        self.port.write(LANGUAGE_KEY, lang).await?;
        *self.language.write().await = lang.to_string();
        info!(language = lang, "Language changed");
        Ok(true)
    }

    /// Look up `key` on the page of `stage`. Falls back to `fallback`, then
    /// to `key` itself.
    pub async fn t(&self, stage: Stage, key: &str, fallback: &str) -> String {
        let default = if fallback.is_empty() { key } else { fallback };
        let (Some(collaborator), Some(page)) = (self.gate.collaborator(), self.page(stage)) else {
            return default.to_string();
        };
        let text = collaborator.t(&self.language().await, page, key, default);
        if text.is_empty() {
            default.to_string()
        } else {
            text
        }
    }

    /// Every string on the page of `stage`.
    pub async fn translations(&self, stage: Stage) -> Translations {
        match (self.gate.collaborator(), self.page(stage)) {
            (Some(collaborator), Some(page)) => {
                collaborator.get_translations(&self.language().await, page)
            }
            _ => Translations::new(),
        }
    }

    /// Display name of `code`: the entry page entry in the current language,
    /// then in English, then the upper-cased code.
    pub async fn language_name(&self, code: &str) -> String {
        let fallback = code.to_uppercase();
        let (Some(collaborator), Some(page)) = (self.gate.collaborator(), self.page(Stage::Entry))
        else {
            return fallback;
        };
        let key = format!("{LANGUAGE_OPTION_PREFIX}{code}");
        let current = self.language().await;
        [current.as_str(), "en"]
            .into_iter()
            .map(|lang| collaborator.t(lang, page, &key, ""))
            .find(|name| !name.is_empty())
            .unwrap_or(fallback)
    }

    /// Supported languages paired with their display names.
    pub async fn language_options(&self) -> Vec<(String, String)> {
        let mut options = Vec::new();
        for code in self.supported_languages().await {
            let name = self.language_name(&code).await;
            options.push((code, name));
        }
        options
    }

    fn page(&self, stage: Stage) -> Option<&str> {
        self.definition.step(stage).map(|step| step.page.as_str())
    }
}
