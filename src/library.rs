//! In-memory store of generated quizzes and the free-text tag vocabulary they use.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::QuizMetadata;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tag {
  pub id: u64,
  pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct QuizRecord {
  pub id: Uuid,
  #[serde(flatten)]
  pub metadata: QuizMetadata,
  pub tags: Vec<Tag>,
  pub created: DateTime<Utc>,
}

/// Case-insensitive name → tag lookup that creates tags on first use.
#[derive(Default)]
pub struct TagVocabulary {
  by_key: HashMap<String, Tag>,
  next_id: u64,
}

impl TagVocabulary {
  /// Resolve names to tags, creating unknown ones. Blank names are dropped,
  /// duplicates collapse to one tag, input order is kept.
  pub fn resolve<S: AsRef<str>>(&mut self, names: &[S]) -> Vec<Tag> {
    let mut out: Vec<Tag> = Vec::new();
    for name in names {
      let name = name.as_ref().trim();
      if name.is_empty() {
        continue;
      }
      let key = name.to_lowercase();
      let tag = match self.by_key.get(&key) {
        Some(tag) => tag.clone(),
        None => {
          self.next_id += 1;
          let tag = Tag { id: self.next_id, name: name.to_string() };
          debug!(target: "quizgen", id = tag.id, name = %tag.name, "Created tag");
          self.by_key.insert(key, tag.clone());
          tag
        }
      };
      if !out.iter().any(|t| t.id == tag.id) {
        out.push(tag);
      }
    }
    out
  }

  pub fn len(&self) -> usize {
    self.by_key.len()
  }
}

#[derive(Clone, Default)]
pub struct Library {
  quizzes: Arc<RwLock<Vec<QuizRecord>>>,
  tags: Arc<RwLock<TagVocabulary>>,
}

impl Library {
  pub fn new() -> Self {
    Self::default()
  }

  #[instrument(level = "debug", skip(self, metadata, tag_names), fields(title = %metadata.title, tags = tag_names.len()))]
  pub async fn save(&self, metadata: QuizMetadata, tag_names: &[String], created: DateTime<Utc>) -> QuizRecord {
    let tags = self.tags.write().await.resolve(tag_names);
    let record = QuizRecord { id: Uuid::new_v4(), metadata, tags, created };
    self.quizzes.write().await.push(record.clone());
    record
  }

  pub async fn get(&self, id: Uuid) -> Option<QuizRecord> {
    self.quizzes.read().await.iter().find(|q| q.id == id).cloned()
  }

  pub async fn list(&self) -> Vec<QuizRecord> {
    self.quizzes.read().await.clone()
  }

  pub async fn tag_count(&self) -> usize {
    self.tags.read().await.len()
  }
}
