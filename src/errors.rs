//! Error types for the completion client, the completion log, configuration
//! loading and the metadata pipeline.

use thiserror::Error;

/// Failure talking to the completion provider.
#[derive(Debug, Error)]
pub enum CompletionError {
  #[error("unsupported completion provider: {0}")]
  UnsupportedProvider(String),

  #[error("transport error: {0}")]
  Transport(String),

  #[error("completion request timed out after {0}s")]
  Timeout(u64),

  #[error("provider returned HTTP {status}: {message}")]
  Api { status: u16, message: String },

  #[error("malformed provider response: {0}")]
  Malformed(String),
}

impl From<reqwest::Error> for CompletionError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      CompletionError::Malformed(err.to_string())
    } else {
      CompletionError::Transport(err.to_string())
    }
  }
}

/// Failure appending to or reading the completion log.
#[derive(Debug, Error)]
pub enum LogError {
  #[error("completion log I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("completion log serialization error: {0}")]
  Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Toml {
    path: String,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid configuration value for {field}: {reason}")]
  InvalidValue { field: &'static str, reason: String },
}

/// Why a pipeline run produced no metadata. Each variant aborts the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("completion call failed: {0}")]
  Transport(#[from] CompletionError),

  #[error("{stage}: response is not valid JSON: {source}")]
  Parse {
    stage: &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error("{stage}: response failed schema validation: {reason}")]
  Schema { stage: &'static str, reason: String },

  #[error("{stage}: response was empty after cleanup")]
  EmptyContent { stage: &'static str },
}

impl PipelineError {
  pub fn kind(&self) -> &'static str {
    match self {
      PipelineError::Transport(_) => "transport",
      PipelineError::Parse { .. } => "parse",
      PipelineError::Schema { .. } => "schema",
      PipelineError::EmptyContent { .. } => "empty_content",
    }
  }
}
