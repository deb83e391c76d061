//! Session store: the only shared mutable state in the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::port::SessionPort;
use super::stage::Stage;
use crate::error::StorageError;

/// Collected field values, keyed by field name.
pub type Fields = BTreeMap<String, String>;

/// Namespaced storage keys for the four persisted session values.
#[derive(Debug, Clone)]
pub struct SessionKeys {
    pub stage: String,
    pub fields: String,
    pub entry_visited: String,
    pub started_at: String,
}

impl SessionKeys {
    pub fn new(namespace: &str) -> Self {
        Self {
            stage: format!("{namespace}.stage"),
            fields: format!("{namespace}.fields"),
            entry_visited: format!("{namespace}.entry_visited"),
            started_at: format!("{namespace}.started_at"),
        }
    }

    /// All four keys; they are always cleared together.
    pub fn all(&self) -> [&str; 4] {
        [
            self.stage.as_str(),
            self.fields.as_str(),
            self.entry_visited.as_str(),
            self.started_at.as_str(),
        ]
    }
}

/// Snapshot of the wizard session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    /// Furthest confirmed stage.
    pub stage: Stage,
    /// Accumulated field values from every completed step.
    pub fields: Fields,
    /// Set once the entry step has rendered.
    pub entry_visited: bool,
    /// When this session was created.
    pub started_at: DateTime<Utc>,
}

impl Session {
    fn fresh() -> Self {
        Self {
            stage: Stage::Entry,
            fields: Fields::new(),
            entry_visited: false,
            started_at: Utc::now(),
        }
    }
}

/// Session state plus the port it is persisted through.
///
/// Reads are served from memory. Every mutation updates memory first and
/// then writes through the port; a failed write is returned to the caller,
/// which keeps running on the in-memory value.
pub struct SessionStore {
    port: Arc<dyn SessionPort>,
    keys: SessionKeys,
    state: RwLock<Session>,
}

impl SessionStore {
    /// Load the persisted session, or create and persist a fresh one if
    /// nothing is stored under `namespace`.
    pub async fn load(
        port: Arc<dyn SessionPort>,
        namespace: &str,
    ) -> Result<Arc<Self>, StorageError> {
        let keys = SessionKeys::new(namespace);
        let started_raw = port.read(&keys.started_at).await?;

        let session = match started_raw {
            None => {
                let session = Session::fresh();
                info!(namespace, "Creating new wizard session");
                let store = Arc::new(Self {
                    port,
                    keys,
                    state: RwLock::new(session),
                });
                store.persist().await?;
                return Ok(store);
            }
            Some(raw) => {
                let started_at = DateTime::parse_from_rfc3339(&raw)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|e| {
                        warn!(namespace, error = %e, "Unreadable session start time, resetting it");
                        Utc::now()
                    });
                let stage = match port.read(&keys.stage).await? {
                    Some(raw) => raw.parse::<Stage>().unwrap_or_else(|e| {
                        warn!(namespace, error = %e, "Unreadable stage, falling back to entry");
                        Stage::Entry
                    }),
                    None => Stage::Entry,
                };
                let fields = match port.read(&keys.fields).await? {
                    Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                        warn!(namespace, error = %e, "Unreadable field map, starting empty");
                        Fields::new()
                    }),
                    None => Fields::new(),
                };
                let entry_visited = port
                    .read(&keys.entry_visited)
                    .await?
                    .is_some_and(|v| v == "true");
                Session {
                    stage,
                    fields,
                    entry_visited,
                    started_at,
                }
            }
        };

        debug!(
            namespace,
            stage = %session.stage,
            fields = session.fields.len(),
            entry_visited = session.entry_visited,
            "Restored wizard session"
        );

        Ok(Arc::new(Self {
            port,
            keys,
            state: RwLock::new(session),
        }))
    }

    /// Copy of the current session.
    pub async fn snapshot(&self) -> Session {
        self.state.read().await.clone()
    }

    pub async fn stage(&self) -> Stage {
        self.state.read().await.stage
    }

    pub async fn entry_visited(&self) -> bool {
        self.state.read().await.entry_visited
    }

    pub async fn fields(&self) -> Fields {
        self.state.read().await.fields.clone()
    }

    pub async fn started_at(&self) -> DateTime<Utc> {
        self.state.read().await.started_at
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Merge values into the collected fields. Existing names are
    /// overwritten, everything else is kept.
    pub async fn merge_fields(&self, fields: &Fields) -> Result<(), StorageError> {
        {
            let mut state = self.state.write().await;
            state
                .fields
                .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        debug!(merged = fields.len(), "Merged step fields into session");
        self.persist().await
    }

    /// Record a stage transition. Reserved for the navigation guard.
    ///
    /// The stage only moves forward; `entry_visited` only moves to `true`.
    pub(crate) async fn apply_transition(
        &self,
        stage: Stage,
        entry_visited: bool,
    ) -> Result<(), StorageError> {
        let (stage, visited, changed) = {
            let mut state = self.state.write().await;
            let next_stage = state.stage.max(stage);
            let next_visited = state.entry_visited || entry_visited;
            let changed = next_stage != state.stage || next_visited != state.entry_visited;
            state.stage = next_stage;
            state.entry_visited = next_visited;
            (next_stage, next_visited, changed)
        };
        if !changed {
            return Ok(());
        }
        info!(stage = %stage, entry_visited = visited, "Session stage updated");
        self.persist().await
    }

    /// Clear every persisted key and start over with a new start time.
    ///
    /// Nothing is written back; storage stays empty until the next mutation.
    pub async fn reset(&self) -> Result<(), StorageError> {
        {
            let mut state = self.state.write().await;
            *state = Session::fresh();
        }
        info!("Wizard session reset");
        self.port.clear(&self.keys.all()).await
    }

    /// Write all four values through the port, so a mutation after `reset`
    /// also records the new start time.
    async fn persist(&self) -> Result<(), StorageError> {
        let session = self.snapshot().await;
        self.port
            .write(&self.keys.stage, session.stage.as_str())
            .await?;
        self.port
            .write(&self.keys.fields, &serde_json::to_string(&session.fields)?)
            .await?;
        self.port
            .write(
                &self.keys.entry_visited,
                if session.entry_visited { "true" } else { "false" },
            )
            .await?;
        self.port
            .write(&self.keys.started_at, &session.started_at.to_rfc3339())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::port::MemoryPort;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn load_creates_and_persists_default_session() {
        let port = Arc::new(MemoryPort::new());
        let store = SessionStore::load(port.clone(), "wizard").await.unwrap();

        let session = store.snapshot().await;
        assert_eq!(session.stage, Stage::Entry);
        assert!(session.fields.is_empty());
        assert!(!session.entry_visited);

        let stored = port.snapshot().await;
        assert_eq!(stored.get("wizard.stage").map(String::as_str), Some("entry"));
        assert_eq!(stored.get("wizard.fields").map(String::as_str), Some("{}"));
        assert_eq!(
            stored.get("wizard.entry_visited").map(String::as_str),
            Some("false")
        );
        assert!(stored.contains_key("wizard.started_at"));
    }

    #[tokio::test]
    async fn load_restores_persisted_session() {
        let port = Arc::new(MemoryPort::new());
        let first = SessionStore::load(port.clone(), "wizard").await.unwrap();
        first
            .merge_fields(&fields(&[("terms_accepted", "true")]))
            .await
            .unwrap();
        first
            .apply_transition(Stage::Intermediate1, true)
            .await
            .unwrap();
        let started = first.started_at().await;

        let second = SessionStore::load(port, "wizard").await.unwrap();
        let session = second.snapshot().await;
        assert_eq!(session.stage, Stage::Intermediate1);
        assert!(session.entry_visited);
        assert_eq!(session.fields["terms_accepted"], "true");
        assert_eq!(session.started_at, started);
    }

    #[tokio::test]
    async fn merge_keeps_fields_from_earlier_steps() {
        let port = Arc::new(MemoryPort::new());
        let store = SessionStore::load(port.clone(), "wizard").await.unwrap();

        store
            .merge_fields(&fields(&[("terms_accepted", "true")]))
            .await
            .unwrap();
        store
            .merge_fields(&fields(&[("name", "Ada"), ("plan", "pro")]))
            .await
            .unwrap();

        let merged = store.fields().await;
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["terms_accepted"], "true");
        assert_eq!(merged["name"], "Ada");

        let persisted: Fields =
            serde_json::from_str(&port.snapshot().await["wizard.fields"]).unwrap();
        assert_eq!(persisted, merged);
    }

    #[tokio::test]
    async fn transition_never_rolls_back() {
        let port = Arc::new(MemoryPort::new());
        let store = SessionStore::load(port, "wizard").await.unwrap();

        store
            .apply_transition(Stage::Intermediate2, true)
            .await
            .unwrap();
        store.apply_transition(Stage::Entry, false).await.unwrap();

        assert_eq!(store.stage().await, Stage::Intermediate2);
        assert!(store.entry_visited().await);
    }

    #[tokio::test]
    async fn reset_clears_storage_and_restarts_clock() {
        let port = Arc::new(MemoryPort::new());
        port.write("language", "de").await.unwrap();
        let store = SessionStore::load(port.clone(), "wizard").await.unwrap();
        store
            .merge_fields(&fields(&[("name", "Ada")]))
            .await
            .unwrap();
        store
            .apply_transition(Stage::Intermediate1, true)
            .await
            .unwrap();
        let started = store.started_at().await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.reset().await.unwrap();

        let stored = port.snapshot().await;
        for key in store.keys().all() {
            assert!(!stored.contains_key(key), "{key} should be cleared");
        }
        // keys outside the namespace are untouched
        assert_eq!(stored.get("language").map(String::as_str), Some("de"));

        let session = store.snapshot().await;
        assert_eq!(session.stage, Stage::Entry);
        assert!(session.fields.is_empty());
        assert!(!session.entry_visited);
        assert!(session.started_at > started);
    }

    #[tokio::test]
    async fn first_mutation_after_reset_persists_everything() {
        let port = Arc::new(MemoryPort::new());
        let store = SessionStore::load(port.clone(), "wizard").await.unwrap();
        store.reset().await.unwrap();
        store
            .merge_fields(&fields(&[("name", "Ada")]))
            .await
            .unwrap();
        let started = store.started_at().await;

        let reloaded = SessionStore::load(port, "wizard").await.unwrap();
        assert_eq!(reloaded.fields().await["name"], "Ada");
        assert_eq!(reloaded.started_at().await, started);
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let port = Arc::new(MemoryPort::new());
        let a = SessionStore::load(port.clone(), "a").await.unwrap();
        let b = SessionStore::load(port.clone(), "b").await.unwrap();

        a.merge_fields(&fields(&[("x", "1")])).await.unwrap();
        b.reset().await.unwrap();

        let reloaded = SessionStore::load(port, "a").await.unwrap();
        assert_eq!(reloaded.fields().await["x"], "1");
    }

    #[tokio::test]
    async fn corrupt_values_fall_back_to_defaults() {
        let port = Arc::new(MemoryPort::new());
        port.write("wizard.started_at", "yesterday").await.unwrap();
        port.write("wizard.stage", "sideways").await.unwrap();
        port.write("wizard.fields", "[1,2").await.unwrap();

        let store = SessionStore::load(port, "wizard").await.unwrap();
        let session = store.snapshot().await;
        assert_eq!(session.stage, Stage::Entry);
        assert!(session.fields.is_empty());
    }
}
