//! Integration tests for the wizard engine and its REST surface.
//!
//! Each test builds a wizard over an in-memory or file-backed port, mounts
//! it with a stub verification module, and drives it either directly or
//! through the axum router.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use stagegate::collaborator::{
    Collaborator, CollaboratorLoader, SecurityCheck, SubmitResult, Translations,
};
use stagegate::config::{LoadFailurePolicy, WizardConfig};
use stagegate::error::CollaboratorError;
use stagegate::gate::GateOutcome;
use stagegate::routes::{WizardRouteState, wizard_routes};
use stagegate::session::{Fields, FilePort, MemoryPort, SessionPort, Stage};
use stagegate::step::WizardDefinition;
use stagegate::wizard::{Screen, Wizard};

/// Stub verification module (no remote calls).
struct StubModule {
    ready: AtomicBool,
    check_error: Option<String>,
    submissions: AtomicUsize,
    last: Mutex<Option<Fields>>,
}

impl StubModule {
    fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            check_error: None,
            submissions: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collaborator for StubModule {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn check_security(&self, _route_label: &str) -> Result<SecurityCheck, CollaboratorError> {
        match &self.check_error {
            Some(reason) => Err(CollaboratorError::call("check_security", reason.clone())),
            None => Ok(SecurityCheck::default()),
        }
    }

    fn get_translations(&self, _lang: &str, _page: &str) -> Translations {
        Translations::new()
    }

    fn t(&self, _lang: &str, _page: &str, _key: &str, fallback: &str) -> String {
        fallback.to_string()
    }

    fn get_supported_languages(&self) -> Vec<String> {
        vec!["en".to_string()]
    }

    async fn submit_form(&self, fields: &Fields) -> Result<SubmitResult, CollaboratorError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(fields.clone());
        Ok(SubmitResult {
            success: true,
            ..Default::default()
        })
    }

    fn get_integrity_hash(&self) -> String {
        "stub-integrity".to_string()
    }

    fn generate_token(&self, purpose: &str) -> String {
        format!("stub-{purpose}")
    }
}

async fn mounted_wizard(
    module: Arc<StubModule>,
    port: Arc<dyn SessionPort>,
) -> (Arc<Wizard>, GateOutcome) {
    let wizard = Wizard::new(WizardConfig::default(), WizardDefinition::standard(), port)
        .await
        .unwrap();
    let loader = CollaboratorLoader::preloaded(module, wizard.config());
    let outcome = wizard.mount(loader, "/").await;
    (Arc::new(wizard), outcome)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test(start_paused = true)]
async fn full_flow_over_http() {
    let module = Arc::new(StubModule::new());
    let (wizard, outcome) = mounted_wizard(module.clone(), Arc::new(MemoryPort::new())).await;
    assert!(outcome.allows_flow());
    let app = wizard_routes(WizardRouteState::new(wizard.clone()));

    // deep link before the entry step bounces back
    let (_, screen) = call(&app, "GET", "/api/wizard/navigate?path=/details", None).await;
    assert_eq!(screen["screen"], "redirect");
    assert_eq!(screen["to"], "/start");
    assert_eq!(screen["replace"], true);

    let (_, screen) = call(&app, "GET", "/api/wizard/navigate?path=/start", None).await;
    assert_eq!(screen["stage"], "entry");

    let (status, body) = call(
        &app,
        "POST",
        "/api/wizard/steps/entry/submit",
        Some(json!({"terms_accepted": "yes"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let next = body["redirect"].as_str().unwrap().to_string();
    assert!(next.starts_with("/preparing?token="));

    let (_, screen) = call(
        &app,
        "GET",
        &format!("/api/wizard/navigate?path={}", next.replace('?', "%3F").replace('=', "%3D")),
        None,
    )
    .await;
    assert_eq!(screen["kind"], "interstitial");
    assert!(screen["token"].is_string());

    let (status, body) = call(&app, "POST", "/api/wizard/steps/intermediate-1/continue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["redirect"].as_str().unwrap().starts_with("/details?token="));

    let (status, body) = call(
        &app,
        "POST",
        "/api/wizard/steps/intermediate-2/submit",
        Some(json!({"name": "  Ada  ", "plan": "standard"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["redirect"].as_str().unwrap().starts_with("/complete?token="));

    let (_, screen) = call(&app, "GET", "/api/wizard/navigate?path=/complete", None).await;
    assert_eq!(screen["kind"], "terminal");

    let fields = wizard.session().fields().await;
    assert_eq!(fields["terms_accepted"], "yes");
    assert_eq!(fields["name"], "Ada");
    assert_eq!(fields["plan"], "standard");
    assert_eq!(wizard.session().stage().await, Stage::Terminal);

    assert_eq!(module.submissions(), 2);
    let last = module.last.lock().unwrap().clone().unwrap();
    assert_eq!(last["terms_accepted"], "yes");
    assert_eq!(last["_integrity"], "stub-integrity");
    assert_eq!(last["_token"], "stub-submit");
    assert_eq!(last["language"], "en");
}

#[tokio::test(start_paused = true)]
async fn concurrent_http_submits_reach_the_module_once() {
    let module = Arc::new(StubModule::new());
    let (wizard, _) = mounted_wizard(module.clone(), Arc::new(MemoryPort::new())).await;
    let app = wizard_routes(WizardRouteState::new(wizard));
    call(&app, "GET", "/api/wizard/navigate?path=/start", None).await;

    let body = Some(json!({"terms_accepted": "true"}));
    let (a, b) = tokio::join!(
        call(&app, "POST", "/api/wizard/steps/entry/submit", body.clone()),
        call(&app, "POST", "/api/wizard/steps/entry/submit", body.clone()),
    );

    let mut statuses = [a.0.as_u16(), b.0.as_u16()];
    statuses.sort();
    assert_eq!(statuses, [200, 409]);
    assert_eq!(module.submissions(), 1);
}

#[tokio::test]
async fn throwing_check_diverts_every_route() {
    let module = Arc::new(StubModule {
        check_error: Some("module crashed".to_string()),
        ..StubModule::new()
    });
    let (wizard, outcome) = mounted_wizard(module.clone(), Arc::new(MemoryPort::new())).await;
    assert!(matches!(outcome, GateOutcome::Blocked(_)));

    for path in ["/start", "/details?token=deadbeef", "/nowhere"] {
        assert_eq!(
            wizard.navigate(path).await,
            Screen::Alternate {
                reason: Some("module crashed".to_string())
            }
        );
    }

    let app = wizard_routes(WizardRouteState::new(wizard));
    let (status, body) = call(
        &app,
        "POST",
        "/api/wizard/steps/entry/submit",
        Some(json!({"terms_accepted": "true"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Session blocked: module crashed");
    assert_eq!(module.submissions(), 0);
}

#[tokio::test(start_paused = true)]
async fn module_that_never_becomes_ready_keeps_flow_closed() {
    let module = Arc::new(StubModule::new());
    module.ready.store(false, Ordering::SeqCst);
    let (wizard, outcome) = mounted_wizard(module.clone(), Arc::new(MemoryPort::new())).await;

    assert_eq!(
        outcome,
        GateOutcome::Unavailable(CollaboratorError::NotReady { polls: 50 })
    );
    assert!(matches!(
        wizard.navigate("/start").await,
        Screen::Unavailable { .. }
    ));

    let app = wizard_routes(WizardRouteState::new(wizard));
    let (status, _) = call(
        &app,
        "POST",
        "/api/wizard/steps/entry/submit",
        Some(json!({"terms_accepted": "true"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test(start_paused = true)]
async fn fail_open_lets_the_flow_render_without_module() {
    let config = WizardConfig {
        load_failure_policy: LoadFailurePolicy::FailOpen,
        ..WizardConfig::default()
    };
    let wizard = Wizard::new(config, WizardDefinition::standard(), Arc::new(MemoryPort::new()))
        .await
        .unwrap();
    let (handle, loader) = CollaboratorLoader::channel(wizard.config());
    handle.failed("network error");
    let outcome = wizard.mount(loader, "/start").await;
    assert!(outcome.is_degraded());

    let app = wizard_routes(WizardRouteState::new(Arc::new(wizard)));
    call(&app, "GET", "/api/wizard/navigate?path=/start", None).await;
    let (status, body) = call(
        &app,
        "POST",
        "/api/wizard/steps/entry/submit",
        Some(json!({"terms_accepted": "true"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Verification module unavailable");
}

#[tokio::test(start_paused = true)]
async fn session_resumes_from_file_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    {
        let module = Arc::new(StubModule::new());
        let (wizard, _) = mounted_wizard(module, Arc::new(FilePort::new(&path))).await;
        wizard.navigate("/start").await;
        let controller = wizard.step_controller(Stage::Entry).await.unwrap();
        let mut form = Fields::new();
        form.insert("terms_accepted".into(), "on".into());
        controller.submit(&form).await;
    }

    let module = Arc::new(StubModule::new());
    let (wizard, _) = mounted_wizard(module, Arc::new(FilePort::new(&path))).await;
    assert!(wizard.session().entry_visited().await);
    assert_eq!(wizard.session().stage().await, Stage::Intermediate1);
    assert_eq!(wizard.session().fields().await["terms_accepted"], "on");
    assert!(matches!(
        wizard.navigate("/details").await,
        Screen::Step {
            stage: Stage::Intermediate2,
            ..
        }
    ));

    wizard.reset().await.unwrap();
    let stored: BTreeMap<String, String> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(stored.keys().all(|k| !k.starts_with("wizard.")));
}
