//! Minimal OpenAI-compatible chat.completions client.
//!
//! One user message in, plain text out. Generation knobs are sent only when
//! the model family accepts them (see `completion::capabilities_for`).
//!
//! NOTE: We never log the API key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::completion::{capabilities_for, Completion, CompletionClient, CompletionRequest};
use crate::config::DEFAULT_PROVIDER;
use crate::errors::CompletionError;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
}

impl OpenAI {
  pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, CompletionError> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| CompletionError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      api_key: api_key.into(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
    })
  }

  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(base_url: &str) -> Option<Self> {
    Self::from_api_key(std::env::var("OPENAI_API_KEY").ok(), base_url)
  }

  /// None for a missing or blank key, or when the HTTP client cannot be built (logged).
  fn from_api_key(api_key: Option<String>, base_url: &str) -> Option<Self> {
    let api_key = api_key.filter(|k| !k.trim().is_empty())?;
    match Self::new(api_key, base_url) {
      Ok(client) => Some(client),
      Err(e) => {
        error!(target: "quizgen", error = %e, "Failed to build OpenAI HTTP client");
        None
      }
    }
  }
}

#[async_trait]
impl CompletionClient for OpenAI {
  #[instrument(level = "debug", skip(self, request), fields(model = %request.model, prompt_len = request.prompt.len()))]
  async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
    if !request.provider.eq_ignore_ascii_case(DEFAULT_PROVIDER) {
      return Err(CompletionError::UnsupportedProvider(request.provider.clone()));
    }

    let body = build_request_body(request);
    let url = format!("{}/chat/completions", self.base_url);

    let res = self.client.post(&url)
      .timeout(Duration::from_secs(request.timeout_secs))
      .header(USER_AGENT, "quizgen-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&body)
      .send()
      .await
      .map_err(|e| classify(e, request.timeout_secs))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(CompletionError::Api { status: status.as_u16(), message });
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| classify(e, request.timeout_secs))?;
    let completion = into_completion(&request.prompt, body)?;
    debug!(total_tokens = completion.total_tokens, "OpenAI usage");
    Ok(completion)
  }
}

fn classify(err: reqwest::Error, timeout_secs: u64) -> CompletionError {
  if err.is_timeout() {
    CompletionError::Timeout(timeout_secs)
  } else {
    err.into()
  }
}

fn build_request_body(request: &CompletionRequest) -> ChatCompletionRequest {
  let caps = capabilities_for(&request.model);
  ChatCompletionRequest {
    model: request.model.clone(),
    messages: vec![ChatMessageReq { role: "user".into(), content: request.prompt.clone() }],
    temperature: caps.temperature.then_some(request.temperature),
    max_tokens: caps.max_tokens.then_some(request.max_tokens),
  }
}

fn into_completion(prompt: &str, body: ChatCompletionResponse) -> Result<Completion, CompletionError> {
  let text = body
    .choices
    .into_iter()
    .next()
    .and_then(|c| c.message.content)
    .ok_or_else(|| CompletionError::Malformed("no choices[0].message.content".into()))?;

  let completion = match body.usage {
    Some(Usage { prompt_tokens: Some(input), completion_tokens: Some(output), total_tokens }) => Completion {
      text,
      input_tokens: input,
      output_tokens: output,
      total_tokens: total_tokens.unwrap_or(input + output),
    },
    _ => Completion::estimated(prompt, text),
  };
  Ok(completion)
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
