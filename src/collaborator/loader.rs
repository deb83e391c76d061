//! Collaborator loader: a single future that resolves once the external
//! module is ready.
//!
//! The host that brings the module in (a script tag, a plugin, a remote
//! handshake) reports progress through a [`LoadHandle`]:
//!
//! - `ready`: the module says it is ready; it must also answer `is_ready`.
//! - `loaded`: the module arrived but has not said anything yet; the loader
//!   polls `is_ready` every `poll_interval`, at most `max_polls` times.
//! - `failed`: the module could not be loaded at all.
//!
//! Everything runs under one `ready_timeout`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::Collaborator;
use crate::config::WizardConfig;
use crate::error::CollaboratorError;

/// Progress report from whoever hosts the module.
pub enum LoadSignal {
    Loaded(Arc<dyn Collaborator>),
    Ready(Arc<dyn Collaborator>),
    Failed(String),
}

/// Sending side, held by the module host.
#[derive(Clone)]
pub struct LoadHandle {
    tx: mpsc::UnboundedSender<LoadSignal>,
}

impl LoadHandle {
    pub fn loaded(&self, collaborator: Arc<dyn Collaborator>) {
        // Ignored if the loader already gave up.
        let _ = self.tx.send(LoadSignal::Loaded(collaborator));
    }

    pub fn ready(&self, collaborator: Arc<dyn Collaborator>) {
        let _ = self.tx.send(LoadSignal::Ready(collaborator));
    }

    pub fn failed(&self, reason: impl Into<String>) {
        let _ = self.tx.send(LoadSignal::Failed(reason.into()));
    }
}

/// Receiving side, consumed by the verification gate.
pub struct CollaboratorLoader {
    rx: mpsc::UnboundedReceiver<LoadSignal>,
    timeout: Duration,
    poll_interval: Duration,
    max_polls: u32,
}

impl CollaboratorLoader {
    /// Create a connected handle/loader pair.
    pub fn channel(config: &WizardConfig) -> (LoadHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            LoadHandle { tx },
            Self {
                rx,
                timeout: config.ready_timeout,
                poll_interval: config.poll_interval,
                max_polls: config.max_polls,
            },
        )
    }

    /// Loader for a module that is already in process.
    pub fn preloaded(collaborator: Arc<dyn Collaborator>, config: &WizardConfig) -> Self {
        let (handle, loader) = Self::channel(config);
        handle.loaded(collaborator);
        loader
    }

    /// Wait until the module is ready, fails, or the timeout expires.
    pub async fn await_ready(mut self) -> Result<Arc<dyn Collaborator>, CollaboratorError> {
        let waited = self.timeout;
        match tokio::time::timeout(waited, self.wait()).await {
            Ok(Ok(collaborator)) => {
                info!("Verification module ready");
                Ok(collaborator)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Verification module unavailable");
                Err(e)
            }
            Err(_) => {
                warn!(waited_ms = waited.as_millis() as u64, "Timed out waiting for verification module");
                Err(CollaboratorError::Timeout { waited })
            }
        }
    }

    async fn wait(&mut self) -> Result<Arc<dyn Collaborator>, CollaboratorError> {
        match self.rx.recv().await {
            Some(LoadSignal::Ready(collaborator)) => confirm_ready(collaborator, 0),
            Some(LoadSignal::Loaded(collaborator)) => self.poll(collaborator).await,
            Some(LoadSignal::Failed(reason)) => Err(CollaboratorError::LoadFailed { reason }),
            None => Err(CollaboratorError::LoadFailed {
                reason: "module host went away before reporting".to_string(),
            }),
        }
    }

    async fn poll(
        &mut self,
        collaborator: Arc<dyn Collaborator>,
    ) -> Result<Arc<dyn Collaborator>, CollaboratorError> {
        if collaborator.is_ready() {
            return Ok(collaborator);
        }

        let max_polls = self.max_polls;
        let rx = &mut self.rx;
        let mut ticker = tokio::time::interval(self.poll_interval);
        // the first tick completes immediately
        ticker.tick().await;

        let mut polls = 0u32;
        let mut host_connected = true;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    polls += 1;
                    if collaborator.is_ready() {
                        debug!(polls, "Verification module became ready while polling");
                        return Ok(collaborator);
                    }
                    if polls >= max_polls {
                        return Err(CollaboratorError::NotReady { polls });
                    }
                }
                signal = rx.recv(), if host_connected => match signal {
                    Some(LoadSignal::Ready(ready)) => return confirm_ready(ready, polls),
                    Some(LoadSignal::Failed(reason)) => {
                        return Err(CollaboratorError::LoadFailed { reason });
                    }
                    Some(LoadSignal::Loaded(_)) => {}
                    None => host_connected = false,
                },
            }
        }
    }
}

fn confirm_ready(
    collaborator: Arc<dyn Collaborator>,
    polls: u32,
) -> Result<Arc<dyn Collaborator>, CollaboratorError> {
    if collaborator.is_ready() {
        Ok(collaborator)
    } else {
        Err(CollaboratorError::NotReady { polls })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::collaborator::testing::MockCollaborator;

    fn config() -> WizardConfig {
        WizardConfig::default()
    }

    #[tokio::test(start_paused = true)]
    async fn preloaded_ready_module_resolves_immediately() {
        let mock = Arc::new(MockCollaborator::new());
        let loader = CollaboratorLoader::preloaded(mock, &config());
        let start = tokio::time::Instant::now();
        assert!(loader.await_ready().await.is_ok());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn loaded_module_is_polled_until_ready() {
        let mock = Arc::new(MockCollaborator::not_ready());
        let (handle, loader) = CollaboratorLoader::channel(&config());
        handle.loaded(mock.clone());

        let flip = mock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            flip.ready.store(true, Ordering::SeqCst);
        });

        let start = tokio::time::Instant::now();
        assert!(loader.await_ready().await.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn loaded_but_never_ready_is_a_soft_failure() {
        let mock = Arc::new(MockCollaborator::not_ready());
        let loader = CollaboratorLoader::preloaded(mock, &config());

        let err = loader.await_ready().await.err().unwrap();
        assert_eq!(err, CollaboratorError::NotReady { polls: 50 });
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out() {
        let (_handle, loader) = CollaboratorLoader::channel(&config());
        let err = loader.await_ready().await.err().unwrap();
        assert_eq!(
            err,
            CollaboratorError::Timeout {
                waited: Duration::from_secs(10)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn polling_is_still_bounded_by_timeout() {
        let config = WizardConfig {
            max_polls: 1_000,
            ..WizardConfig::default()
        };
        let mock = Arc::new(MockCollaborator::not_ready());
        let loader = CollaboratorLoader::preloaded(mock, &config);
        assert!(matches!(
            loader.await_ready().await,
            Err(CollaboratorError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn failure_signal_is_a_load_failure() {
        let (handle, loader) = CollaboratorLoader::channel(&config());
        handle.failed("404 from module host");
        let err = loader.await_ready().await.err().unwrap();
        assert_eq!(
            err,
            CollaboratorError::LoadFailed {
                reason: "404 from module host".into()
            }
        );
    }

    #[tokio::test]
    async fn ready_signal_without_readiness_is_rejected() {
        let (handle, loader) = CollaboratorLoader::channel(&config());
        handle.ready(Arc::new(MockCollaborator::not_ready()));
        assert_eq!(
            loader.await_ready().await.err().unwrap(),
            CollaboratorError::NotReady { polls: 0 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ready_signal_interrupts_polling() {
        let (handle, loader) = CollaboratorLoader::channel(&config());
        handle.loaded(Arc::new(MockCollaborator::not_ready()));

        let late = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            late.ready(Arc::new(MockCollaborator::new()));
        });

        assert!(loader.await_ready().await.is_ok());
    }

    #[tokio::test]
    async fn dropped_host_is_a_load_failure() {
        let (handle, loader) = CollaboratorLoader::channel(&config());
        drop(handle);
        assert!(matches!(
            loader.await_ready().await,
            Err(CollaboratorError::LoadFailed { .. })
        ));
    }
}
