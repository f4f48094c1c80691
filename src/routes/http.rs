//! HTTP endpoint handlers. These are thin wrappers that forward to the pipeline and library.
//! Each handler is instrumented and logs basic result info.

use std::sync::Arc;

use axum::{
  extract::{rejection::JsonRejection, Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::protocol::*;
use crate::state::AppState;

fn error_response(status: StatusCode, message: &str) -> Response {
  (status, Json(ErrorOut { error: message.to_string() })).into_response()
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut {
    ok: true,
    generation_enabled: state.pipeline.is_some(),
    model: state.config.generator.model.clone(),
    quizzes: state.library.list().await.len(),
    tags: state.library.tag_count().await,
  })
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_generate_quiz(
  State(state): State<Arc<AppState>>,
  body: Result<Json<GenerateIn>, JsonRejection>,
) -> Response {
  let Some(pipeline) = state.pipeline.as_ref() else {
    return error_response(StatusCode::SERVICE_UNAVAILABLE, "quiz generation is not configured");
  };
  // No body (and so no JSON content type) means no tags; a body that fails to parse is rejected.
  let tags = match body {
    Ok(Json(b)) => b.tags,
    Err(JsonRejection::MissingJsonContentType(_)) => Vec::new(),
    Err(rejection) => {
      info!(target: "quizgen", error = %rejection.body_text(), "Rejected generate request body");
      return error_response(rejection.status(), &rejection.body_text());
    }
  };

  match pipeline.generate_quiz_metadata().await {
    Ok(metadata) => {
      let record = state.library.save(metadata, &tags, state.clock.now()).await;
      info!(target: "quizgen", id = %record.id, title = %record.metadata.title, tags = record.tags.len(), "Quiz generated");
      (StatusCode::CREATED, Json(record)).into_response()
    }
    Err(e) => {
      error!(target: "quizgen", kind = e.kind(), error = %e, "Quiz generation failed");
      error_response(StatusCode::BAD_GATEWAY, "quiz generation failed, check logs")
    }
  }
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_quiz(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
  match state.library.get(id).await {
    Some(record) => Json(record).into_response(),
    None => error_response(StatusCode::NOT_FOUND, "quiz not found"),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_quizzes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.library.list().await)
}

/// Newest entries last, limited to the most recent `limit`.
#[instrument(level = "info", skip(state), fields(limit = ?q.limit))]
pub async fn http_list_completions(
  State(state): State<Arc<AppState>>,
  Query(q): Query<CompletionsQuery>,
) -> Response {
  let limit = q.limit.unwrap_or(DEFAULT_COMPLETIONS_LIMIT);
  match state.completion_log.entries().await {
    Ok(entries) => {
      let skip = entries.len().saturating_sub(limit);
      Json(entries.into_iter().skip(skip).collect::<Vec<_>>()).into_response()
    }
    Err(e) => {
      error!(target: "quizgen", error = %e, "Failed to read completion log");
      error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read completion log")
    }
  }
}
