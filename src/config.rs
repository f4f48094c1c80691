//! Service configuration: generator settings, prompt templates, and paths.
//!
//! Loaded from the TOML file named by `QUIZGEN_CONFIG_PATH` (optional), then
//! overridden by environment variables. Every field has a default, so an empty
//! file and a missing file both yield a working configuration.
//!
//! ```toml
//! completion_log_path = "var/completions.jsonl"
//!
//! [generator]
//! provider_id = "openai"
//! model = "gpt-4o"
//! temperature = 0.7
//! max_tokens = 4096
//! timeout_secs = 90
//!
//! [prompts]
//! topic_template = "..."
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

use crate::errors::ConfigError;

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// Generation parameters passed with every completion call.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
  pub provider_id: String,
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
  pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
  fn default() -> Self {
    Self {
      provider_id: DEFAULT_PROVIDER.into(),
      model: DEFAULT_MODEL.into(),
      temperature: DEFAULT_TEMPERATURE,
      max_tokens: DEFAULT_MAX_TOKENS,
      timeout_secs: DEFAULT_TIMEOUT_SECS,
    }
  }
}

impl GeneratorConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.provider_id.trim().is_empty() {
      return Err(ConfigError::InvalidValue { field: "provider_id", reason: "must not be empty".into() });
    }
    if self.model.trim().is_empty() {
      return Err(ConfigError::InvalidValue { field: "model", reason: "must not be empty".into() });
    }
    if !(0.0..=2.0).contains(&self.temperature) {
      return Err(ConfigError::InvalidValue {
        field: "temperature",
        reason: format!("{} is outside 0.0..=2.0", self.temperature),
      });
    }
    if self.max_tokens == 0 {
      return Err(ConfigError::InvalidValue { field: "max_tokens", reason: "must be greater than 0".into() });
    }
    if self.timeout_secs == 0 {
      return Err(ConfigError::InvalidValue { field: "timeout_secs", reason: "must be greater than 0".into() });
    }
    Ok(())
  }
}

/// Prompt templates for the three pipeline stages.
/// Placeholders use `{name}` and are filled by `util::fill_template`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// Placeholders: {subject}, {subject_id}, {education_level}, {education_level_id},
  /// {difficulty}, {difficulty_id}, {cognitive_goal_options}
  pub base_metadata_template: String,
  /// Placeholders: {subject}, {education_level}, {difficulty}, {cognitive_goal}
  pub topic_template: String,
  /// Placeholders: {topic}, {subject}, {education_level}, {difficulty}, {cognitive_goal}
  pub prompt_title_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      base_metadata_template: r#"You are classifying an educational quiz.

The following facets are already decided and MUST be returned exactly as given:
- subject: {"id": {subject_id}, "label": "{subject}"}
- education_level: {"id": {education_level_id}, "label": "{education_level}"}
- difficulty: {"id": {difficulty_id}, "label": "{difficulty}"}

Choose ONLY the cognitive_goal that best fits a quiz with these facets. Options:
{cognitive_goal_options}

Respond with exactly ONE JSON object and nothing else. It must have exactly these four keys:
subject, education_level, difficulty, cognitive_goal.
Each value is an object of the form {"id": <integer>, "label": "<string>"}.
No Markdown, no code fences, no commentary."#
        .into(),
      topic_template: r#"Suggest one educational quiz topic.

Subject: {subject}
Education level: {education_level}
Difficulty: {difficulty}
Cognitive goal: {cognitive_goal}

The topic must suit all four facets. Reply with the topic only: a short phrase on a single line, without quotes, numbering or explanation."#
        .into(),
      prompt_title_template: r#"Write the brief for an educational quiz.

Topic: {topic}
Subject: {subject}
Education level: {education_level}
Difficulty: {difficulty}
Cognitive goal: {cognitive_goal}

Reply with exactly two lines and nothing else:
PROMPT: <one or two sentences telling a quiz author what the quiz should test>
TITLE: <a concise quiz title, at most 100 characters>"#
        .into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub generator: GeneratorConfig,
  pub prompts: Prompts,
  /// JSONL completion log. `None` keeps the log in memory only.
  pub completion_log_path: Option<PathBuf>,
  pub openai_base_url: String,
  pub bind_addr: SocketAddr,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      generator: GeneratorConfig::default(),
      prompts: Prompts::default(),
      completion_log_path: None,
      openai_base_url: "https://api.openai.com/v1".into(),
      bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
    }
  }
}

impl AppConfig {
  pub fn from_toml_str(s: &str, path: &str) -> Result<Self, ConfigError> {
    toml::from_str::<AppConfig>(s).map_err(|source| ConfigError::Toml { path: path.to_string(), source })
  }

  /// Apply environment overrides using the given lookup (std::env::var in production).
  pub fn apply_overrides<F>(&mut self, lookup: F)
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(v) = lookup("OPENAI_BASE_URL") {
      self.openai_base_url = v;
    }
    if let Some(v) = lookup("QUIZGEN_PROVIDER") {
      self.generator.provider_id = v;
    }
    if let Some(v) = lookup("QUIZGEN_MODEL") {
      self.generator.model = v;
    }
    if let Some(v) = lookup("QUIZGEN_LOG_PATH") {
      self.completion_log_path = Some(PathBuf::from(v));
    }
    if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
      self.bind_addr.set_port(port);
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.generator.validate()
  }
}

/// Load configuration: optional TOML file from QUIZGEN_CONFIG_PATH, then env overrides.
pub fn load_from_env() -> Result<AppConfig, ConfigError> {
  let mut cfg = match std::env::var("QUIZGEN_CONFIG_PATH") {
    Ok(path) => {
      let raw = std::fs::read_to_string(&path).map_err(|source| {
        error!(target: "quizgen", %path, error = %source, "Failed to read TOML config file");
        ConfigError::Io { path: path.clone(), source }
      })?;
      let cfg = AppConfig::from_toml_str(&raw, &path).map_err(|e| {
        error!(target: "quizgen", %path, error = %e, "Failed to parse TOML config");
        e
      })?;
      info!(target: "quizgen", %path, "Loaded config (TOML)");
      cfg
    }
    Err(_) => AppConfig::default(),
  };

  cfg.apply_overrides(|key| std::env::var(key).ok());
  cfg.validate()?;
  Ok(cfg)
}
