//! Application state: configuration, the metadata pipeline (if a provider is
//! configured), the completion log, and the quiz library.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::completion::{Completer, CompletionClient};
use crate::completion_log::{Clock, CompletionLog, JsonlCompletionLog, MemoryCompletionLog, SystemClock};
use crate::config::AppConfig;
use crate::errors::LogError;
use crate::library::Library;
use crate::metadata::MetadataPipeline;
use crate::openai::OpenAI;

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<AppConfig>,
  /// `None` when no completion provider is configured (no OPENAI_API_KEY).
  pub pipeline: Option<Arc<MetadataPipeline>>,
  pub completion_log: Arc<dyn CompletionLog>,
  pub library: Library,
  pub clock: Arc<dyn Clock>,
}

impl AppState {
  /// Build state from config: open the completion log, init OpenAI if a key is present.
  #[instrument(level = "info", skip_all)]
  pub async fn new(config: AppConfig) -> Result<Self, LogError> {
    let completion_log: Arc<dyn CompletionLog> = match &config.completion_log_path {
      Some(path) => Arc::new(JsonlCompletionLog::open(path).await?),
      None => {
        warn!(target: "quizgen", "No completion log path configured; keeping completion log in memory");
        Arc::new(MemoryCompletionLog::new())
      }
    };

    let client: Option<Arc<dyn CompletionClient>> = match OpenAI::from_env(&config.openai_base_url) {
      Some(oa) => {
        info!(target: "quizgen", base_url = %oa.base_url, model = %config.generator.model, "OpenAI enabled.");
        Some(Arc::new(oa))
      }
      None => {
        warn!(target: "quizgen", "OpenAI disabled (no OPENAI_API_KEY, or client init failed). Quiz generation unavailable.");
        None
      }
    };

    Ok(Self::with_client(config, client, completion_log, Arc::new(SystemClock)))
  }

  /// Assemble state from explicit parts.
  pub fn with_client(
    config: AppConfig,
    client: Option<Arc<dyn CompletionClient>>,
    completion_log: Arc<dyn CompletionLog>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    let pipeline = client.map(|client| {
      let completer = Completer::new(client, completion_log.clone(), clock.clone());
      Arc::new(MetadataPipeline::new(config.generator.clone(), config.prompts.clone(), completer))
    });

    Self {
      config: Arc::new(config),
      pipeline,
      completion_log,
      library: Library::new(),
      clock,
    }
  }
}
