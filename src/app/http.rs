use axum::Router;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::app::service::QuizService;
use crate::error::{QuizError, ServiceErrorKind};
use crate::model::{Book, DEFAULT_USER_ID, EvaluationReport, Quiz};
use crate::progress::{BookProgressReport, ProgressReport};

pub fn router(service: QuizService) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/books", post(create_book))
        .route("/books/:book_id/quizzes", get(list_quizzes))
        .route("/quizzes/generate/:book_id", post(generate_quiz))
        .route("/quizzes/:quiz_id", get(get_quiz))
        .route("/quizzes/:quiz_id/submit", post(submit_quiz))
        .route("/progress", get(progress_report))
        .route("/progress/books/:book_id", get(book_progress))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Quiz(QuizError),
}

impl From<QuizError> for ApiError {
    fn from(err: QuizError) -> Self {
        Self::Quiz(err)
    }
}

// Malformed bodies and queries get the same `{error, retryable}` shape as
// every other failure.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

pub fn status_for(err: &QuizError) -> StatusCode {
    match err {
        QuizError::QuizNotFound(_) | QuizError::BookNotFound(_) | QuizError::ProgressNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        QuizError::AlreadyGraded(_) => StatusCode::CONFLICT,
        QuizError::ServiceUnavailable(err) if err.kind == ServiceErrorKind::RateLimited => {
            StatusCode::TOO_MANY_REQUESTS
        }
        QuizError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        QuizError::MalformedOutput(_) => StatusCode::BAD_GATEWAY,
        QuizError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message,
                    retryable: false,
                },
            ),
            Self::Quiz(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    tracing::error!(?err, status = status.as_u16(), "request failed");
                }
                let error = match &err {
                    // Storage details carry file paths.
                    QuizError::Storage(_) => "Internal storage error".to_owned(),
                    other => other.to_string(),
                };
                (
                    status,
                    ErrorBody {
                        error,
                        retryable: err.is_retryable(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBookRequest {
    title: String,
    text_content: String,
}

async fn create_book(
    State(service): State<QuizService>,
    payload: Result<Json<CreateBookRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let Json(req) = payload?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title is required".to_owned()));
    }
    if req.text_content.trim().is_empty() {
        return Err(ApiError::BadRequest("textContent is required".to_owned()));
    }
    let book = service.create_book(title, &req.text_content).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

async fn list_quizzes(
    State(service): State<QuizService>,
    Path(book_id): Path<String>,
) -> Result<Json<Vec<Quiz>>, ApiError> {
    Ok(Json(service.list_quizzes(&book_id).await?))
}

async fn generate_quiz(
    State(service): State<QuizService>,
    Path(book_id): Path<String>,
) -> Result<Json<Quiz>, ApiError> {
    Ok(Json(service.generate_quiz_for_book(&book_id).await?))
}

async fn get_quiz(
    State(service): State<QuizService>,
    Path(quiz_id): Path<String>,
) -> Result<Json<Quiz>, ApiError> {
    Ok(Json(service.get_quiz(&quiz_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    #[serde(default)]
    answers: Vec<Option<String>>,
    #[serde(default)]
    user_id: Option<String>,
}

async fn submit_quiz(
    State(service): State<QuizService>,
    Path(quiz_id): Path<String>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<EvaluationReport>, ApiError> {
    let Json(req) = payload?;
    let answers: Vec<String> = req
        .answers
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect();
    let user_id = user_or_default(req.user_id);
    Ok(Json(service.evaluate_quiz(&quiz_id, &answers, &user_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    #[serde(default)]
    user_id: Option<String>,
}

async fn progress_report(
    State(service): State<QuizService>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<ProgressReport>, ApiError> {
    let Query(q) = query?;
    let user_id = user_or_default(q.user_id);
    Ok(Json(service.progress_report(&user_id).await?))
}

async fn book_progress(
    State(service): State<QuizService>,
    Path(book_id): Path<String>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<BookProgressReport>, ApiError> {
    let Query(q) = query?;
    let user_id = user_or_default(q.user_id);
    Ok(Json(service.book_progress(&user_id, &book_id).await?))
}

fn user_or_default(user_id: Option<String>) -> String {
    user_id
        .map(|id| id.trim().to_owned())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_USER_ID.to_owned())
}
