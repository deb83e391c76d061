use std::sync::Arc;

use stagegate::collaborator::{Collaborator, CollaboratorLoader, LocalCollaborator};
use stagegate::config::WizardConfig;
use stagegate::routes::{WizardRouteState, wizard_routes};
use stagegate::session::{FilePort, MemoryPort, SessionPort};
use stagegate::step::WizardDefinition;
use stagegate::wizard::Wizard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = WizardConfig::from_env()?;

    let port: u16 = std::env::var("STAGEGATE_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let collaborator: Arc<dyn Collaborator> = match std::env::var("STAGEGATE_CATALOG") {
        Ok(path) => Arc::new(LocalCollaborator::from_catalog_file(&path)?),
        Err(_) => Arc::new(LocalCollaborator::default()),
    };

    let storage: Arc<dyn SessionPort> = match std::env::var("STAGEGATE_SESSION_FILE") {
        Ok(path) => {
            tracing::info!(path = %path, "Using file-backed session storage");
            Arc::new(FilePort::new(path))
        }
        Err(_) => Arc::new(MemoryPort::new()),
    };

    eprintln!("Stagegate v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/wizard/status", port);
    eprintln!(
        "   Load failure policy: {:?}, pacing {:?}",
        config.load_failure_policy, config.pacing_delay
    );

    let loader = CollaboratorLoader::preloaded(collaborator, &config);
    let wizard = Arc::new(Wizard::new(config, WizardDefinition::standard(), storage).await?);
    let outcome = wizard.mount(loader, "/").await;
    tracing::info!(outcome = outcome.label(), "Verification gate settled");

    let app = wizard_routes(WizardRouteState::new(wizard));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!(port, "Wizard API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
