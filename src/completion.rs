//! Completion client seam plus the logging wrapper every pipeline call goes through.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info};

use crate::completion_log::{Clock, CompletionLog, NewLogEntry};
use crate::config::GeneratorConfig;
use crate::domain::CompletionKind;
use crate::errors::CompletionError;
use crate::util::{estimate_tokens, trunc_for_log};

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
  pub prompt: String,
  pub provider: String,
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
  pub timeout_secs: u64,
}

impl CompletionRequest {
  pub fn from_config(prompt: impl Into<String>, cfg: &GeneratorConfig) -> Self {
    Self {
      prompt: prompt.into(),
      provider: cfg.provider_id.clone(),
      model: cfg.model.clone(),
      temperature: cfg.temperature,
      max_tokens: cfg.max_tokens,
      timeout_secs: cfg.timeout_secs,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
  pub text: String,
  pub input_tokens: u32,
  pub output_tokens: u32,
  pub total_tokens: u32,
}

impl Completion {
  /// Build a completion whose usage is estimated from text length.
  pub fn estimated(prompt: &str, text: impl Into<String>) -> Self {
    let text = text.into();
    let input_tokens = estimate_tokens(prompt);
    let output_tokens = estimate_tokens(&text);
    Self { text, input_tokens, output_tokens, total_tokens: input_tokens + output_tokens }
  }
}

/// A hosted language-model provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
  async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError>;
}

/// Which generation knobs a model family accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelCapabilities {
  pub temperature: bool,
  pub max_tokens: bool,
}

impl ModelCapabilities {
  pub const FULL: ModelCapabilities = ModelCapabilities { temperature: true, max_tokens: true };
  pub const REASONING: ModelCapabilities = ModelCapabilities { temperature: false, max_tokens: false };
}

/// Model-name prefixes (lowercase) with non-default capabilities. First match wins.
const MODEL_FAMILIES: &[(&str, ModelCapabilities)] = &[
  ("o1", ModelCapabilities::REASONING),
  ("o3", ModelCapabilities::REASONING),
  ("o4", ModelCapabilities::REASONING),
  ("gpt-5", ModelCapabilities::REASONING),
];

pub fn capabilities_for(model: &str) -> ModelCapabilities {
  let model = model.trim().to_ascii_lowercase();
  MODEL_FAMILIES
    .iter()
    .find(|(prefix, _)| model.starts_with(prefix))
    .map(|(_, caps)| *caps)
    .unwrap_or(ModelCapabilities::FULL)
}

/// Client + log + clock. Every call is recorded, success or not; nothing is retried.
#[derive(Clone)]
pub struct Completer {
  client: Arc<dyn CompletionClient>,
  log: Arc<dyn CompletionLog>,
  clock: Arc<dyn Clock>,
}

impl Completer {
  pub fn new(client: Arc<dyn CompletionClient>, log: Arc<dyn CompletionLog>, clock: Arc<dyn Clock>) -> Self {
    Self { client, log, clock }
  }

  pub fn clock(&self) -> &dyn Clock {
    self.clock.as_ref()
  }

  pub async fn complete(
    &self,
    kind: CompletionKind,
    request: &CompletionRequest,
  ) -> Result<Completion, CompletionError> {
    let started = Instant::now();
    let result = self.client.complete(request).await;
    let response_time_ms = started.elapsed().as_millis() as u64;

    let (response, usage) = match &result {
      Ok(c) => (c.text.clone(), (c.input_tokens, c.output_tokens, c.total_tokens)),
      Err(e) => {
        let input = estimate_tokens(&request.prompt);
        (format!("ERROR: {e}"), (input, 0, input))
      }
    };

    match &result {
      Ok(_) => info!(
        target: "completion",
        kind = kind.as_str(),
        model = %request.model,
        input_tokens = usage.0,
        output_tokens = usage.1,
        total_tokens = usage.2,
        response_time_ms,
        response_preview = %trunc_for_log(&response, 80),
        "Completion received"
      ),
      Err(e) => error!(
        target: "completion",
        kind = kind.as_str(),
        model = %request.model,
        response_time_ms,
        error = %e,
        "Completion failed"
      ),
    }

    let entry = NewLogEntry {
      request: request.prompt.clone(),
      response,
      model: request.model.clone(),
      input_tokens: usage.0,
      output_tokens: usage.1,
      total_tokens: usage.2,
      temperature: request.temperature,
      response_time_ms,
      created: self.clock.now(),
      kind,
    };
    if let Err(e) = self.log.append(entry).await {
      error!(target: "completion", kind = kind.as_str(), error = %e, "Failed to append completion log entry");
    }

    result
  }
}
