//! Append-only record of every completion call.
//!
//! The file backend writes one JSON object per line and never rewrites the
//! file. Ids are `max(existing) + 1`, assigned under a mutex that also
//! serializes the write.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::CompletionKind;
use crate::errors::LogError;

/// Source of "now". Injected so timestamps and the fallback seed are testable.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl FixedClock {
  pub fn at_unix(secs: i64) -> Self {
    Self(DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default())
  }
}

#[cfg(test)]
impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.0
  }
}

/// Persisted log record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionLogEntry {
  pub id: u64,
  pub request: String,
  pub response: String,
  pub model: String,
  pub input_tokens: u32,
  pub output_tokens: u32,
  pub total_tokens: u32,
  pub temperature: f32,
  pub response_time_ms: u64,
  pub created: DateTime<Utc>,
  #[serde(rename = "type")]
  pub kind: CompletionKind,
}

/// Everything but the id, which the sink assigns.
#[derive(Clone, Debug)]
pub struct NewLogEntry {
  pub request: String,
  pub response: String,
  pub model: String,
  pub input_tokens: u32,
  pub output_tokens: u32,
  pub total_tokens: u32,
  pub temperature: f32,
  pub response_time_ms: u64,
  pub created: DateTime<Utc>,
  pub kind: CompletionKind,
}

impl NewLogEntry {
  fn with_id(self, id: u64) -> CompletionLogEntry {
    CompletionLogEntry {
      id,
      request: self.request,
      response: self.response,
      model: self.model,
      input_tokens: self.input_tokens,
      output_tokens: self.output_tokens,
      total_tokens: self.total_tokens,
      temperature: self.temperature,
      response_time_ms: self.response_time_ms,
      created: self.created,
      kind: self.kind,
    }
  }
}

#[async_trait]
pub trait CompletionLog: Send + Sync {
  async fn append(&self, entry: NewLogEntry) -> Result<CompletionLogEntry, LogError>;
  async fn entries(&self) -> Result<Vec<CompletionLogEntry>, LogError>;
}

/// In-process log; used when no path is configured and in tests.
#[derive(Default)]
pub struct MemoryCompletionLog {
  entries: Mutex<Vec<CompletionLogEntry>>,
}

impl MemoryCompletionLog {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl CompletionLog for MemoryCompletionLog {
  async fn append(&self, entry: NewLogEntry) -> Result<CompletionLogEntry, LogError> {
    let mut entries = self.entries.lock().await;
    let id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
    let entry = entry.with_id(id);
    entries.push(entry.clone());
    Ok(entry)
  }

  async fn entries(&self) -> Result<Vec<CompletionLogEntry>, LogError> {
    Ok(self.entries.lock().await.clone())
  }
}

/// JSON-lines file log.
pub struct JsonlCompletionLog {
  path: PathBuf,
  last_id: Mutex<u64>,
}

impl JsonlCompletionLog {
  /// Open (or prepare to create) the log at `path`, recovering the highest id.
  pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
    let path = path.into();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await?;
    }

    if terminate_partial_line(&path).await? {
      warn!(target: "completion", path = %path.display(), "Completion log ended mid-line; terminated the partial record");
    }

    let last_id = read_entries(&path)
      .await?
      .iter()
      .map(|e| e.id)
      .max()
      .unwrap_or(0);
    info!(target: "completion", path = %path.display(), last_id, "Completion log opened");

    Ok(Self { path, last_id: Mutex::new(last_id) })
  }
}

#[async_trait]
impl CompletionLog for JsonlCompletionLog {
  async fn append(&self, entry: NewLogEntry) -> Result<CompletionLogEntry, LogError> {
    let mut last_id = self.last_id.lock().await;
    let entry = entry.with_id(*last_id + 1);

    let mut line = serde_json::to_string(&entry)?;
    line.push('\n');

    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;

    *last_id = entry.id;
    Ok(entry)
  }

  async fn entries(&self) -> Result<Vec<CompletionLogEntry>, LogError> {
    let _guard = self.last_id.lock().await;
    read_entries(&self.path).await
  }
}

/// Append a newline if the file's last record was cut off, so the next
/// append starts on its own line. Returns whether a newline was written.
async fn terminate_partial_line(path: &Path) -> Result<bool, LogError> {
  let mut file = match OpenOptions::new().read(true).append(true).open(path).await {
    Ok(file) => file,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
    Err(e) => return Err(e.into()),
  };
  if file.metadata().await?.len() == 0 {
    return Ok(false);
  }

  let mut last = [0u8; 1];
  file.seek(SeekFrom::End(-1)).await?;
  file.read_exact(&mut last).await?;
  if last[0] == b'\n' {
    return Ok(false);
  }

  file.write_all(b"\n").await?;
  file.flush().await?;
  Ok(true)
}

async fn read_entries(path: &Path) -> Result<Vec<CompletionLogEntry>, LogError> {
  let raw = match tokio::fs::read_to_string(path).await {
    Ok(raw) => raw,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(e.into()),
  };

  let mut out = Vec::new();
  for (lineno, line) in raw.lines().enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    match serde_json::from_str::<CompletionLogEntry>(line) {
      Ok(entry) => out.push(entry),
      Err(e) => {
        warn!(target: "completion", path = %path.display(), line = lineno + 1, error = %e, "Skipping unreadable completion log line");
      }
    }
  }
  Ok(out)
}
