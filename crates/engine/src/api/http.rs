//! HTTP routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taleweaver_domain::{MediaJobId, SessionId};
use uuid::Uuid;

use crate::app::App;
use crate::infrastructure::ports::MediaStatus;
use crate::use_cases::{HealthReport, SessionView, TurnError, TurnResult};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(readiness))
        .route("/api/world", get(get_world))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(close_session))
        .route("/api/sessions/{id}/turns", post(play_turn))
        .route("/api/sessions/{id}/media/{job_id}", get(get_media))
}

async fn health() -> &'static str {
    "OK"
}

/// 503 when no provider can narrate; turns would only get the fallback text.
async fn readiness(State(app): State<Arc<App>>) -> (StatusCode, Json<HealthReport>) {
    let report = app.sessions.engine().health().await;
    let status = if report.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[derive(Debug, Serialize)]
pub struct WorldInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub intro: String,
    pub providers: Vec<String>,
}

async fn get_world(State(app): State<Arc<App>>) -> Json<WorldInfo> {
    let engine = app.sessions.engine();
    let world = engine.world();
    Json(WorldInfo {
        id: world.id().to_string(),
        title: world.title().to_string(),
        description: world.description().to_string(),
        intro: world.intro(),
        providers: engine.llm().provider_names(),
    })
}

// =============================================================================
// Sessions
// =============================================================================

async fn create_session(
    State(app): State<Arc<App>>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let view = app.sessions.create().await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_session(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let view = app.sessions.summary(SessionId::from_uuid(id)).await?;
    Ok(Json(view))
}

async fn close_session(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app.sessions.close(SessionId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub input: String,
}

async fn play_turn(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResult>, ApiError> {
    let result = app
        .sessions
        .play(SessionId::from_uuid(id), &request.input)
        .await?;
    Ok(Json(result))
}

// =============================================================================
// Media
// =============================================================================

async fn get_media(
    State(app): State<Arc<App>>,
    Path((id, job_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MediaStatus>, ApiError> {
    let status = app
        .sessions
        .media_status(SessionId::from_uuid(id), MediaJobId::from_uuid(job_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(status))
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            ApiError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Storage unavailable, try again",
            )
                .into_response(),
        }
    }
}

impl From<TurnError> for ApiError {
    fn from(e: TurnError) -> Self {
        match e {
            TurnError::InvalidInput(msg) => ApiError::BadRequest(msg),
            TurnError::TurnInProgress(_) => ApiError::Conflict(e.to_string()),
            TurnError::SessionNotFound(_) => ApiError::NotFound,
            TurnError::Persistence(msg) => {
                tracing::error!(error = %msg, "Request failed on persistence");
                ApiError::Unavailable(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::llm_manager::{LlmManager, RetryConfig};
    use crate::infrastructure::persistence::InMemorySessionRepo;
    use crate::infrastructure::scripted_llm::ScriptedLlm;
    use crate::test_fixtures::moonlit;
    use std::time::Duration;
    use crate::use_cases::turn::tests::{engine_with, scripted_llm};
    use axum::response::IntoResponse;

    fn app() -> Arc<App> {
        let engine = engine_with(
            moonlit(),
            scripted_llm(),
            Arc::new(InMemorySessionRepo::new()),
            None,
        );
        Arc::new(App::new(Arc::new(engine)))
    }

    #[test]
    fn turn_errors_map_to_status_codes() {
        let id = SessionId::new();
        let cases = [
            (TurnError::InvalidInput("empty".into()), StatusCode::BAD_REQUEST),
            (TurnError::TurnInProgress(id), StatusCode::CONFLICT),
            (TurnError::SessionNotFound(id), StatusCode::NOT_FOUND),
            (
                TurnError::Persistence("disk full".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (error, expected) in cases {
            let response = ApiError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn session_lifecycle_over_handlers() {
        let app = app();

        let (status, Json(view)) = create_session(State(app.clone())).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        let id = *view.session_id.as_uuid();

        let Json(result) = play_turn(
            State(app.clone()),
            Path(id),
            Json(TurnRequest {
                input: "I look at the sea".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(result.turn, 1);

        let Json(view) = get_session(State(app.clone()), Path(id)).await.unwrap();
        assert_eq!(view.state.turn, 1);

        let status = close_session(State(app.clone()), Path(id)).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn empty_input_is_a_bad_request() {
        let app = app();
        let (_, Json(view)) = create_session(State(app.clone())).await.unwrap();

        let result = play_turn(
            State(app),
            Path(*view.session_id.as_uuid()),
            Json(TurnRequest { input: "  ".into() }),
        )
        .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn unknown_media_job_is_not_found() {
        let app = app();
        let (_, Json(view)) = create_session(State(app.clone())).await.unwrap();

        let result = get_media(
            State(app),
            Path((*view.session_id.as_uuid(), Uuid::new_v4())),
        )
        .await;

        assert!(matches!(result, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn readiness_reports_provider_health() {
        let (status, Json(report)) = readiness(State(app())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.providers.len(), 1);
        assert!(report.media.is_none());
    }

    #[tokio::test]
    async fn readiness_fails_without_a_healthy_provider() {
        let llm = Arc::new(LlmManager::new(
            vec![Arc::new(ScriptedLlm::new(vec![]))],
            RetryConfig::default(),
            Duration::from_secs(1),
        ));
        let engine = engine_with(moonlit(), llm, Arc::new(InMemorySessionRepo::new()), None);

        let (status, Json(report)) = readiness(State(Arc::new(App::new(Arc::new(engine))))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!report.providers[0].healthy);
    }

    #[tokio::test]
    async fn world_info_lists_providers() {
        let Json(info) = get_world(State(app())).await;
        assert_eq!(info.id, "moonlit");
        assert_eq!(info.providers, vec!["scripted".to_string()]);
    }
}
