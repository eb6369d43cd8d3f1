use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt as _;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use studyquiz::app::http::router;
use studyquiz::app::memory_store::MemoryStore;
use studyquiz::app::service::{QuizService, Stores};
use studyquiz::openai::OpenAiChatProvider;
use studyquiz::provider::ProviderConfig;

mod openai_stub;

use openai_stub::{OpenAiStub, STUB_API_KEY, StubBehavior};

fn app(stub: &OpenAiStub) -> anyhow::Result<Router> {
    let config = ProviderConfig {
        openai_base_url: stub.base_url.clone(),
        min_request_interval: Duration::ZERO,
        timeout: Duration::from_secs(10),
        ..Default::default()
    };
    let provider = Arc::new(OpenAiChatProvider::new(&config, STUB_API_KEY.to_owned())?);
    let store = Arc::new(MemoryStore::default());
    Ok(router(QuizService::new(provider, Stores::shared(store))))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> anyhow::Result<(StatusCode, Value)> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Ok((status, value))
}

#[tokio::test]
async fn healthz_is_ok() -> anyhow::Result<()> {
    let stub = OpenAiStub::spawn(StubBehavior::Valid);
    let app = app(&stub)?;
    let (status, body) = send(&app, "GET", "/healthz", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok\n".to_owned()));
    Ok(())
}

#[tokio::test]
async fn book_to_quiz_to_progress_round_trip() -> anyhow::Result<()> {
    let stub = OpenAiStub::spawn(StubBehavior::Valid);
    let app = app(&stub)?;

    let (status, book) = send(
        &app,
        "POST",
        "/books",
        Some(json!({"title": "Plants", "textContent": "Chloroplasts capture light."})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let book_id = book["id"].as_str().expect("book id").to_owned();

    let (status, quiz) = send(&app, "POST", &format!("/quizzes/generate/{book_id}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    let quiz_id = quiz["id"].as_str().expect("quiz id").to_owned();
    assert_eq!(quiz["bookId"], book_id.as_str());
    assert_eq!(quiz["questions"][0]["type"], "mcq");

    let (status, listed) = send(&app, "GET", &format!("/books/{book_id}/quizzes"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let (status, report) = send(
        &app,
        "POST",
        &format!("/quizzes/{quiz_id}/submit"),
        Some(json!({"answers": ["B", null]})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["score"], 50.0);
    assert_eq!(report["totalQuestions"], 2);
    assert_eq!(report["results"][1]["userAnswer"], "");
    assert!(report.get("progressError").is_none());

    let (status, again) = send(
        &app,
        "POST",
        &format!("/quizzes/{quiz_id}/submit"),
        Some(json!({"answers": ["B", "Oxygen"]})),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["retryable"], false);

    let (status, progress) = send(&app, "GET", "/progress", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["quizPerformance"]["totalQuizzes"], 1);
    assert_eq!(progress["detailedProgress"][0]["bookTitle"], "Plants");

    let (status, book_progress) =
        send(&app, "GET", &format!("/progress/books/{book_id}?userId=default-user"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book_progress["mcqStats"]["correct"], 1);

    let (status, _) =
        send(&app, "GET", &format!("/progress/books/{book_id}?userId=someone-else"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn missing_records_are_404() -> anyhow::Result<()> {
    let stub = OpenAiStub::spawn(StubBehavior::Valid);
    let app = app(&stub)?;

    let (status, body) = send(&app, "GET", "/quizzes/nope", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("nope")));

    let (status, _) = send(&app, "POST", "/quizzes/generate/nope", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(stub.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn empty_book_is_rejected() -> anyhow::Result<()> {
    let stub = OpenAiStub::spawn(StubBehavior::Valid);
    let app = app(&stub)?;
    let (status, body) = send(
        &app,
        "POST",
        "/books",
        Some(json!({"title": "Empty", "textContent": "   "})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "textContent is required");
    Ok(())
}

#[tokio::test]
async fn provider_errors_map_to_gateway_statuses() -> anyhow::Result<()> {
    let rate_limited = OpenAiStub::spawn(StubBehavior::Status(429));
    let app_429 = app(&rate_limited)?;
    let (_, book) = send(
        &app_429,
        "POST",
        "/books",
        Some(json!({"title": "T", "textContent": "x"})),
    )
    .await?;
    let book_id = book["id"].as_str().expect("book id").to_owned();
    let (status, body) = send(&app_429, "POST", &format!("/quizzes/generate/{book_id}"), None).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["retryable"], true);

    let overloaded = OpenAiStub::spawn(StubBehavior::Status(500));
    let app_500 = app(&overloaded)?;
    let (_, book) = send(
        &app_500,
        "POST",
        "/books",
        Some(json!({"title": "T", "textContent": "x"})),
    )
    .await?;
    let book_id = book["id"].as_str().expect("book id").to_owned();
    let (status, _) = send(&app_500, "POST", &format!("/quizzes/generate/{book_id}"), None).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let prose = OpenAiStub::spawn(StubBehavior::ProseQuiz);
    let app_prose = app(&prose)?;
    let (_, book) = send(
        &app_prose,
        "POST",
        "/books",
        Some(json!({"title": "T", "textContent": "x"})),
    )
    .await?;
    let book_id = book["id"].as_str().expect("book id").to_owned();
    let (status, body) = send(&app_prose, "POST", &format!("/quizzes/generate/{book_id}"), None).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().is_some_and(|e| e.starts_with("AI returned invalid format")));
    Ok(())
}

#[tokio::test]
async fn malformed_json_body_is_a_json_400() -> anyhow::Result<()> {
    let stub = OpenAiStub::spawn(StubBehavior::Valid);
    let app = app(&stub)?;

    for uri in ["/books", "/quizzes/any/submit"] {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from("{not json"))?;
        let response = app.clone().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let bytes = response.into_body().collect().await?.to_bytes();
        let body: Value = serde_json::from_slice(&bytes)?;
        assert_eq!(body["retryable"], false);
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    let (status, body) = send(&app, "POST", "/books", Some(json!({"title": "T"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["retryable"], false);
    assert_eq!(stub.request_count(), 0);
    Ok(())
}
