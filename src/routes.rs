//! REST endpoints driving the wizard.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::SubmissionError;
use crate::guard::{Navigation, Route};
use crate::session::{Fields, Stage};
use crate::step::{StepController, StepKind, SubmitOutcome};
use crate::wizard::Wizard;

/// Shared state for wizard routes.
#[derive(Clone)]
pub struct WizardRouteState {
    pub wizard: Arc<Wizard>,
    /// One mounted controller per step, so concurrent requests for the same
    /// step share its in-flight flag.
    pub controllers: Arc<Mutex<HashMap<Stage, Arc<StepController>>>>,
}

impl WizardRouteState {
    pub fn new(wizard: Arc<Wizard>) -> Self {
        Self {
            wizard,
            controllers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn controller(&self, stage: Stage) -> Option<Arc<StepController>> {
        let mut controllers = self.controllers.lock().await;
        if let Some(controller) = controllers.get(&stage) {
            return Some(Arc::clone(controller));
        }
        let controller = Arc::new(self.wizard.step_controller(stage).await?);
        controllers.insert(stage, Arc::clone(&controller));
        Some(controller)
    }
}

#[derive(Deserialize)]
struct NavigateQuery {
    path: Option<String>,
}

#[derive(Deserialize)]
struct LanguageBody {
    language: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"error": message.into()}))).into_response()
}

/// GET /api/wizard/status
///
/// Gate outcome plus the session summary (field names only).
async fn get_status(State(state): State<WizardRouteState>) -> impl IntoResponse {
    Json(state.wizard.status().await)
}

/// GET /api/wizard/navigate?path=/details?token=..
///
/// What to show for the path. Rendering a step records it in the session.
async fn navigate(
    State(state): State<WizardRouteState>,
    Query(query): Query<NavigateQuery>,
) -> impl IntoResponse {
    let path = query.path.unwrap_or_else(|| "/".to_string());
    Json(state.wizard.navigate(&path).await)
}

/// Resolve a step id from the URL and make sure the session may act on it.
async fn open_step(state: &WizardRouteState, step: &str) -> Result<Arc<StepController>, Response> {
    let wizard = &state.wizard;
    let Ok(stage) = step.parse::<Stage>() else {
        return Err(error_response(StatusCode::NOT_FOUND, format!("Unknown step {step}")));
    };

    match wizard.gate().outcome() {
        Some(outcome) if outcome.allows_flow() => {}
        Some(outcome) => {
            let message = outcome
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Flow closed".to_string());
            return Err(error_response(StatusCode::FORBIDDEN, message));
        }
        None => {
            return Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Wizard not mounted yet",
            ));
        }
    }

    match wizard.guard().check(Route::Stage(stage).path()).await {
        Navigation::Render(_) => {}
        Navigation::Redirect { to, replace } => {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({"outcome": "redirect", "redirect": to.to_url(), "replace": replace})),
            )
                .into_response());
        }
        Navigation::Alternate => {
            return Err(error_response(StatusCode::NOT_FOUND, format!("Unknown step {step}")));
        }
    }

    state
        .controller(stage)
        .await
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("Unknown step {step}")))
}

/// POST /api/wizard/steps/{step}/submit
///
/// Body is the step's form as a flat string map.
async fn submit_step(
    State(state): State<WizardRouteState>,
    Path(step): Path<String>,
    Json(form): Json<Fields>,
) -> Response {
    let controller = match open_step(&state, &step).await {
        Ok(controller) => controller,
        Err(response) => return response,
    };

    match controller.submit(&form).await {
        SubmitOutcome::Advanced(location) => {
            info!(step = %step, next = %location.route.path(), "Step completed");
            Json(json!({
                "outcome": "advanced",
                "redirect": location.to_url(),
                "replace": true,
            }))
            .into_response()
        }
        SubmitOutcome::Invalid(error) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"outcome": "invalid", "field": error.field, "error": error.message})),
        )
            .into_response(),
        SubmitOutcome::Failed(SubmissionError::Rejected { message }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"outcome": "rejected", "error": message})),
        )
            .into_response(),
        SubmitOutcome::Failed(SubmissionError::Failed { message }) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"outcome": "failed", "error": message})),
        )
            .into_response(),
        SubmitOutcome::InFlight => (
            StatusCode::CONFLICT,
            Json(json!({"outcome": "in_flight"})),
        )
            .into_response(),
        SubmitOutcome::Detached => (
            StatusCode::GONE,
            Json(json!({"outcome": "detached"})),
        )
            .into_response(),
    }
}

/// POST /api/wizard/steps/{step}/continue
///
/// Waits out an interstitial step and returns where to go next.
async fn continue_step(
    State(state): State<WizardRouteState>,
    Path(step): Path<String>,
) -> Response {
    let controller = match open_step(&state, &step).await {
        Ok(controller) => controller,
        Err(response) => return response,
    };
    if controller.definition().kind != StepKind::Interstitial {
        return error_response(StatusCode::BAD_REQUEST, format!("Step {step} does not auto-advance"));
    }
    let Some(pending) = controller.begin_interstitial() else {
        return error_response(StatusCode::BAD_REQUEST, format!("Step {step} has no next step"));
    };
    match pending.await {
        Ok(location) => Json(json!({
            "outcome": "advanced",
            "redirect": location.to_url(),
            "replace": true,
        }))
        .into_response(),
        Err(_) => (StatusCode::GONE, Json(json!({"outcome": "detached"}))).into_response(),
    }
}

/// POST /api/wizard/reset
///
/// Unmounts every step and clears the session.
async fn reset(State(state): State<WizardRouteState>) -> Response {
    {
        let mut controllers = state.controllers.lock().await;
        for controller in controllers.values() {
            controller.unmount();
        }
        controllers.clear();
    }
    match state.wizard.reset().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!(error = %e, "Session reset failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/wizard/i18n/{step}
async fn get_translations(
    State(state): State<WizardRouteState>,
    Path(step): Path<String>,
) -> Response {
    let Ok(stage) = step.parse::<Stage>() else {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown step {step}"));
    };
    let translator = state.wizard.translator();
    Json(json!({
        "language": translator.language().await,
        "texts": translator.translations(stage).await,
    }))
    .into_response()
}

/// POST /api/wizard/language
async fn set_language(
    State(state): State<WizardRouteState>,
    Json(body): Json<LanguageBody>,
) -> Response {
    let translator = state.wizard.translator();
    match translator.change_language(&body.language).await {
        Ok(true) => {
            // controllers carry the language into their submissions
            let mut controllers = state.controllers.lock().await;
            controllers.retain(|_, controller| controller.is_submitting());
            Json(json!({"language": body.language})).into_response()
        }
        Ok(false) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("Unsupported language {}", body.language),
                "supported": translator.supported_languages().await,
            })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/wizard/language
///
/// Current language plus every supported one with its display name.
async fn get_languages(State(state): State<WizardRouteState>) -> impl IntoResponse {
    let translator = state.wizard.translator();
    let options: Vec<_> = translator
        .language_options()
        .await
        .into_iter()
        .map(|(code, name)| json!({"code": code, "name": name}))
        .collect();
    Json(json!({
        "language": translator.language().await,
        "options": options,
    }))
}

/// Build the wizard REST routes.
pub fn wizard_routes(state: WizardRouteState) -> Router {
    Router::new()
        .route("/api/wizard/status", get(get_status))
        .route("/api/wizard/navigate", get(navigate))
        .route("/api/wizard/steps/{step}/submit", post(submit_step))
        .route("/api/wizard/steps/{step}/continue", post(continue_step))
        .route("/api/wizard/reset", post(reset))
        .route("/api/wizard/i18n/{step}", get(get_translations))
        .route("/api/wizard/language", get(get_languages).post(set_language))
        .with_state(state)
}
