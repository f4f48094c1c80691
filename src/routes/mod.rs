//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers), adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/quiz/generate", post(http::http_generate_quiz))
        .route("/api/v1/quiz/:id", get(http::http_get_quiz))
        .route("/api/v1/quizzes", get(http::http_list_quizzes))
        .route("/api/v1/completions", get(http::http_list_completions))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use mockall::Sequence;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::completion::{Completion, CompletionClient, MockCompletionClient};
    use crate::completion_log::{FixedClock, MemoryCompletionLog};
    use crate::config::AppConfig;
    use crate::errors::CompletionError;

    fn state_with(client: Option<MockCompletionClient>) -> Arc<AppState> {
        let client = client.map(|c| Arc::new(c) as Arc<dyn CompletionClient>);
        Arc::new(AppState::with_client(
            AppConfig::default(),
            client,
            Arc::new(MemoryCompletionLog::new()),
            Arc::new(FixedClock::at_unix(1_700_000_000)),
        ))
    }

    /// A client that echoes back the preselected facets and picks "Apply".
    fn happy_client() -> MockCompletionClient {
        let mut mock = MockCompletionClient::new();
        let mut seq = Sequence::new();
        mock.expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                // Pull the pinned facets out of the stage-1 prompt.
                let line = |key: &str| -> Value {
                    let prefix = format!("- {key}: ");
                    let raw = req
                        .prompt
                        .lines()
                        .find_map(|l| l.strip_prefix(&prefix))
                        .unwrap_or("{}");
                    serde_json::from_str(raw).unwrap_or(Value::Null)
                };
                let body = json!({
                    "subject": line("subject"),
                    "education_level": line("education_level"),
                    "difficulty": line("difficulty"),
                    "cognitive_goal": {"id": 26, "label": "Apply"},
                });
                Ok(Completion::estimated(&req.prompt, body.to_string()))
            });
        mock.expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| Ok(Completion::estimated(&req.prompt, "Budgeting basics")));
        mock.expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                Ok(Completion::estimated(
                    &req.prompt,
                    "PROMPT: Apply a simple monthly budget.\nTITLE: Make a Budget",
                ))
            });
        mock
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_generation_availability() {
        let app = build_router(state_with(None));
        let res = app
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert_eq!(v["ok"], true);
        assert_eq!(v["generation_enabled"], false);
        assert_eq!(v["model"], "gpt-4o");
        assert_eq!(v["quizzes"], 0);
    }

    #[tokio::test]
    async fn generate_without_provider_is_unavailable() {
        let app = build_router(state_with(None));
        let res = app
            .oneshot(Request::builder().method("POST").uri("/api/v1/quiz/generate").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn generate_saves_and_returns_the_record() {
        let state = state_with(Some(happy_client()));
        let app = build_router(state.clone());

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/quiz/generate")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"tags": ["Finance", "finance", "Life skills"]}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::CREATED);
        let v = body_json(res).await;
        assert_eq!(v["title"], "Make a Budget");
        assert_eq!(v["cognitive_goal"]["id"], 26);
        assert_eq!(v["tags"].as_array().map(|t| t.len()), Some(2));

        let id = v["id"].as_str().expect("id").to_string();
        let res = app
            .clone()
            .oneshot(Request::builder().uri(format!("/api/v1/quiz/{id}")).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .oneshot(Request::builder().uri("/api/v1/completions?limit=2").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let v = body_json(res).await;
        let types: Vec<&str> = v.as_array().expect("array").iter().filter_map(|e| e["type"].as_str()).collect();
        assert_eq!(types, vec!["topic", "prompt_title"]);
        assert_eq!(state.completion_log.entries().await.expect("entries").len(), 3);
    }

    #[tokio::test]
    async fn pipeline_failure_maps_to_bad_gateway() {
        let mut mock = MockCompletionClient::new();
        mock.expect_complete()
            .times(1)
            .returning(|_| Err(CompletionError::Api { status: 500, message: "upstream".into() }));
        let state = state_with(Some(mock));
        let app = build_router(state.clone());

        let res = app
            .oneshot(Request::builder().method("POST").uri("/api/v1/quiz/generate").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let v = body_json(res).await;
        assert_eq!(v["error"], "quiz generation failed, check logs");
        assert!(state.library.list().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_generate_body_is_rejected() {
        // No expectations: the provider must not be called.
        let state = state_with(Some(MockCompletionClient::new()));
        let app = build_router(state.clone());

        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/quiz/generate")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"tags": 5}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let v = body_json(res).await;
        assert!(v["error"].as_str().is_some_and(|e| !e.is_empty()));
        assert!(state.library.list().await.is_empty());
        assert!(state.completion_log.entries().await.expect("entries").is_empty());
    }

    #[tokio::test]
    async fn unparseable_generate_body_is_a_bad_request() {
        let state = state_with(Some(MockCompletionClient::new()));
        let app = build_router(state);

        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/quiz/generate")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"tags\": ["))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_quiz_is_not_found() {
        let app = build_router(state_with(None));
        let uri = format!("/api/v1/quiz/{}", uuid::Uuid::new_v4());
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
