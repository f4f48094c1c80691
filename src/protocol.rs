//! HTTP request/response DTOs (serde ready).

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct GenerateIn {
  #[serde(default)]
  pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionsQuery {
  pub limit: Option<usize>,
}

pub const DEFAULT_COMPLETIONS_LIMIT: usize = 50;

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
  pub generation_enabled: bool,
  pub model: String,
  pub quizzes: usize,
  pub tags: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
  pub error: String,
}
