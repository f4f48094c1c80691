//! Domain models produced by the metadata pipeline.

use serde::{Deserialize, Serialize};

/// A taxonomy value: `{id, label}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
  pub id: i64,
  pub label: String,
}

/// Output of Stage 1: the four taxonomy facets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseMetadata {
  pub subject: Term,
  pub education_level: Term,
  pub difficulty: Term,
  pub cognitive_goal: Term,
}

/// Output of Stage 3.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizContent {
  pub prompt: String,
  pub title: String,
}

/// Terminal artifact of a successful pipeline run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizMetadata {
  pub title: String,
  pub prompt: String,
  #[serde(flatten)]
  pub base: BaseMetadata,
}

impl QuizMetadata {
  pub fn new(base: BaseMetadata, content: QuizContent) -> Self {
    Self { title: content.title, prompt: content.prompt, base }
  }
}

/// Purpose of a completion call; stored as the log entry's `type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
  BaseMetadata,
  Topic,
  PromptTitle,
}

impl CompletionKind {
  pub fn as_str(self) -> &'static str {
    match self {
      CompletionKind::BaseMetadata => "base_metadata",
      CompletionKind::Topic => "topic",
      CompletionKind::PromptTitle => "prompt_title",
    }
  }
}
