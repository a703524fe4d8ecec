use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{CourseConfig, Settings};
use crate::database::Table;
use crate::github::Forge;
use crate::workflows::{groups, students, submissions, Course};

#[derive(Clone)]
pub struct AppState {
    forge: Arc<dyn Forge>,
    settings: Arc<Settings>,
    config: Arc<CourseConfig>,
}

impl AppState {
    pub fn new(forge: Arc<dyn Forge>, settings: Settings, config: CourseConfig) -> Self {
        Self {
            forge,
            settings: Arc::new(settings),
            config: Arc::new(config),
        }
    }

    fn course(&self) -> Course<'_> {
        Course::new(self.forge.as_ref(), &self.settings, (*self.config).clone())
    }

    /// Redirects to the configured success or error page.
    fn redirect<T>(&self, form: &str, result: Result<T>) -> Redirect {
        match result {
            Ok(_) => {
                info!("{form} form accepted");
                Redirect::to(&self.config.redirects.success)
            }
            Err(err) => {
                warn!("{form} form rejected: {err:#}");
                Redirect::to(&self.config.redirects.error)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    course: String,
}

#[derive(Debug, Serialize)]
struct Recorded {
    table: String,
}

#[derive(Debug, Default, Deserialize)]
struct StudentForm {
    github: Option<String>,
    hopkins: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AssignmentForm {
    assignment: Option<String>,
    github: Option<String>,
    commit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IterationForm {
    iteration: Option<String>,
    group: Option<String>,
    commit: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/students", post(student_form))
        .route("/assignments", post(assignment_form))
        .route("/groups", post(group_form))
        .route("/iterations", post(iteration_form))
        .route("/feedbacks", post(feedback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState, bind: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("web forms listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("missing form field `{field}`"))
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        course: state.settings.course.clone(),
    })
}

async fn student_form(State(state): State<AppState>, Form(form): Form<StudentForm>) -> Redirect {
    let result = async {
        let github = required(form.github, "github")?;
        let hopkins = required(form.hopkins, "hopkins")?;
        students::onboard(&state.course(), &github, &hopkins).await
    }
    .await;
    state.redirect("student", result)
}

async fn assignment_form(
    State(state): State<AppState>,
    Form(form): Form<AssignmentForm>,
) -> Redirect {
    let result = async {
        let assignment = required(form.assignment, "assignment")?;
        let github = required(form.github, "github")?;
        let commit = required(form.commit, "commit")?;
        submissions::receive_assignment(&state.course(), &assignment, &github, &commit).await
    }
    .await;
    state.redirect("assignment", result)
}

/// Members arrive as repeated `members` (or `members[]`) fields.
async fn group_form(
    State(state): State<AppState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Redirect {
    let result = async {
        let identifier = required(
            fields
                .iter()
                .find(|(k, _)| k == "identifier")
                .map(|(_, v)| v.clone()),
            "identifier",
        )?;
        let members = fields
            .iter()
            .filter(|(k, _)| k == "members" || k == "members[]")
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>();
        if members.is_empty() {
            return Err(anyhow!("missing form field `members`"));
        }
        groups::create(&state.course(), &identifier, &members).await
    }
    .await;
    state.redirect("group", result)
}

async fn iteration_form(
    State(state): State<AppState>,
    Form(form): Form<IterationForm>,
) -> Redirect {
    let result = async {
        let iteration = required(form.iteration, "iteration")?;
        let group = required(form.group, "group")?;
        let commit = required(form.commit, "commit")?;
        submissions::submit_iteration(&state.course(), &iteration, &group, &commit, None).await
    }
    .await;
    state.redirect("iteration", result)
}

/// Feedback forms are stored exactly as posted.
async fn feedback(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Recorded> {
    state
        .course()
        .database()
        .insert(Table::Feedbacks, &body)
        .await
        .map_err(ApiError::internal)?;
    Ok(ok(Recorded {
        table: Table::Feedbacks.to_string(),
    }))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}
