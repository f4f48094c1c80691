//! Quiz metadata generation pipeline.
//!
//! Three sequential stages, each one completion call whose output feeds the next:
//!   1) base metadata: level/subject/difficulty drawn locally, the model picks the
//!      cognitive goal and echoes all four facets as JSON.
//!   2) topic: one line of text suitable for all four facets.
//!   3) prompt + title: two tagged lines, `PROMPT:` and `TITLE:`.
//!
//! Any stage failure aborts the run; nothing partial is returned and nothing
//! beyond the raw stage calls is written to the completion log.

use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use crate::cleanup::{clean_json_response, clean_topic, parse_prompt_and_title};
use crate::completion::{Completer, CompletionRequest};
use crate::config::{GeneratorConfig, Prompts};
use crate::domain::{BaseMetadata, CompletionKind, QuizContent, QuizMetadata, Term};
use crate::errors::PipelineError;
use crate::taxonomy::{fallback_metadata, preselect, Facet, Preselection, COGNITIVE_GOALS};
use crate::util::{fill_template, trunc_for_log};

const STAGE_BASE: &str = "base_metadata";
const STAGE_TOPIC: &str = "topic";
const STAGE_PROMPT_TITLE: &str = "prompt_title";

/// Result of checking the stage-1 JSON answer.
#[derive(Debug, PartialEq)]
pub enum BaseMetadataCheck {
  Valid(BaseMetadata),
  /// A key was absent or empty; the caller substitutes the local fallback.
  Incomplete { missing: Vec<&'static str> },
}

pub struct MetadataPipeline {
  config: GeneratorConfig,
  prompts: Prompts,
  completer: Completer,
}

impl MetadataPipeline {
  pub fn new(config: GeneratorConfig, prompts: Prompts, completer: Completer) -> Self {
    Self { config, prompts, completer }
  }

  /// Run all stages with a thread-local RNG.
  pub async fn generate_quiz_metadata(&self) -> Result<QuizMetadata, PipelineError> {
    let pre = preselect(&mut rand::thread_rng());
    self.generate_with_preselection(pre).await
  }

  /// Run all stages from an explicit preselection (seeded callers and tests).
  #[instrument(
    level = "info",
    skip(self, pre),
    fields(model = %self.config.model, level = pre.education_level.id, subject = pre.subject.id, difficulty = pre.difficulty.id)
  )]
  pub async fn generate_with_preselection(&self, pre: Preselection) -> Result<QuizMetadata, PipelineError> {
    let result = async {
      let base = self.generate_base_metadata(&pre).await?;
      let topic = self.generate_topic(&base).await?;
      let content = self.generate_prompt_and_title(&topic, &base).await?;
      Ok::<_, PipelineError>(QuizMetadata::new(base, content))
    }
    .await;

    match &result {
      Ok(meta) => info!(
        target: "metadata",
        title = %meta.title,
        subject = meta.base.subject.id,
        education_level = meta.base.education_level.id,
        difficulty = meta.base.difficulty.id,
        cognitive_goal = meta.base.cognitive_goal.id,
        "Quiz metadata generated"
      ),
      Err(e) => error!(target: "metadata", kind = e.kind(), error = %e, "Quiz metadata generation failed"),
    }
    result
  }

  /// Stage 1.
  #[instrument(level = "info", skip_all)]
  pub async fn generate_base_metadata(&self, pre: &Preselection) -> Result<BaseMetadata, PipelineError> {
    let prompt = build_base_metadata_prompt(&self.prompts, pre);
    let request = CompletionRequest::from_config(prompt, &self.config);
    let raw = self.completer.complete(CompletionKind::BaseMetadata, &request).await?.text;

    let cleaned = clean_json_response(&raw);
    let value: Value = serde_json::from_str(&cleaned).map_err(|source| {
      error!(target: "metadata", raw = %trunc_for_log(&raw, 500), cleaned = %trunc_for_log(&cleaned, 500), "Base metadata response is not JSON");
      PipelineError::Parse { stage: STAGE_BASE, source }
    })?;

    match check_base_metadata(&value) {
      Ok(BaseMetadataCheck::Valid(base)) => Ok(base),
      Ok(BaseMetadataCheck::Incomplete { missing }) => {
        let seed = self.completer.clock().now().timestamp();
        let base = fallback_metadata(seed);
        warn!(target: "metadata", ?missing, seed, raw = %trunc_for_log(&raw, 500), "Base metadata incomplete; using deterministic fallback");
        Ok(base)
      }
      Err(reason) => {
        error!(target: "metadata", %reason, raw = %trunc_for_log(&raw, 500), cleaned = %trunc_for_log(&cleaned, 500), "Base metadata failed validation");
        Err(PipelineError::Schema { stage: STAGE_BASE, reason })
      }
    }
  }

  /// Stage 2.
  #[instrument(level = "info", skip_all)]
  pub async fn generate_topic(&self, base: &BaseMetadata) -> Result<String, PipelineError> {
    let prompt = fill_template(&self.prompts.topic_template, &label_pairs(base));
    let request = CompletionRequest::from_config(prompt, &self.config);
    let raw = self.completer.complete(CompletionKind::Topic, &request).await?.text;

    let topic = clean_topic(&raw);
    if topic.is_empty() {
      error!(target: "metadata", raw = %trunc_for_log(&raw, 500), "Topic empty after cleanup");
      return Err(PipelineError::EmptyContent { stage: STAGE_TOPIC });
    }
    info!(target: "metadata", %topic, "Topic generated");
    Ok(topic)
  }

  /// Stage 3.
  #[instrument(level = "info", skip_all, fields(%topic))]
  pub async fn generate_prompt_and_title(&self, topic: &str, base: &BaseMetadata) -> Result<QuizContent, PipelineError> {
    let mut pairs = label_pairs(base);
    pairs.push(("topic", topic));
    let prompt = fill_template(&self.prompts.prompt_title_template, &pairs);
    let request = CompletionRequest::from_config(prompt, &self.config);
    let raw = self.completer.complete(CompletionKind::PromptTitle, &request).await?.text;

    match parse_prompt_and_title(&raw) {
      (Some(prompt), Some(title)) => Ok(QuizContent { prompt, title }),
      (prompt, title) => {
        error!(
          target: "metadata",
          has_prompt = prompt.is_some(),
          has_title = title.is_some(),
          raw = %trunc_for_log(&raw, 500),
          "Prompt/title missing from response"
        );
        Err(PipelineError::EmptyContent { stage: STAGE_PROMPT_TITLE })
      }
    }
  }
}

fn label_pairs(base: &BaseMetadata) -> Vec<(&'static str, &str)> {
  vec![
    ("subject", base.subject.label.as_str()),
    ("education_level", base.education_level.label.as_str()),
    ("difficulty", base.difficulty.label.as_str()),
    ("cognitive_goal", base.cognitive_goal.label.as_str()),
  ]
}

pub fn build_base_metadata_prompt(prompts: &Prompts, pre: &Preselection) -> String {
  let goal_options = COGNITIVE_GOALS
    .iter()
    .map(|g| format!("- {{\"id\": {}, \"label\": \"{}\"}}", g.id, g.label))
    .collect::<Vec<_>>()
    .join("\n");
  let subject_id = pre.subject.id.to_string();
  let level_id = pre.education_level.id.to_string();
  let difficulty_id = pre.difficulty.id.to_string();

  fill_template(
    &prompts.base_metadata_template,
    &[
      ("subject", pre.subject.label),
      ("subject_id", &subject_id),
      ("education_level", pre.education_level.label),
      ("education_level_id", &level_id),
      ("difficulty", pre.difficulty.label),
      ("difficulty_id", &difficulty_id),
      ("cognitive_goal_options", &goal_options),
    ],
  )
}

/// Validate the parsed stage-1 answer.
///
/// Missing or empty keys → `Incomplete` (fallback path). Present keys with the
/// wrong shape or an id outside the facet's table → `Err` (hard failure).
pub fn check_base_metadata(value: &Value) -> Result<BaseMetadataCheck, String> {
  let obj = value
    .as_object()
    .ok_or_else(|| "top-level value is not an object".to_string())?;

  let missing: Vec<&'static str> = Facet::ALL
    .iter()
    .map(|f| f.key())
    .filter(|key| obj.get(*key).map_or(true, is_empty_value))
    .collect();
  if !missing.is_empty() {
    return Ok(BaseMetadataCheck::Incomplete { missing });
  }

  let term = |facet: Facet| -> Result<Term, String> {
    let key = facet.key();
    let field = obj
      .get(key)
      .and_then(Value::as_object)
      .ok_or_else(|| format!("{key} is not an object"))?;
    let id = numeric_id(field).ok_or_else(|| format!("{key}.id is missing or not numeric"))?;
    let label = field
      .get("label")
      .and_then(Value::as_str)
      .ok_or_else(|| format!("{key}.label is missing or not a string"))?;
    if !facet.contains(id) {
      return Err(format!("{key}.id {id} is not one of {:?}", facet.valid_ids()));
    }
    Ok(Term { id, label: label.to_string() })
  };

  Ok(BaseMetadataCheck::Valid(BaseMetadata {
    subject: term(Facet::Subject)?,
    education_level: term(Facet::EducationLevel)?,
    difficulty: term(Facet::Difficulty)?,
    cognitive_goal: term(Facet::CognitiveGoal)?,
  }))
}

fn is_empty_value(v: &Value) -> bool {
  match v {
    Value::Null => true,
    Value::Bool(b) => !b,
    Value::Number(n) => n.as_f64() == Some(0.0),
    Value::String(s) => s.trim().is_empty() || s == "0",
    Value::Array(a) => a.is_empty(),
    Value::Object(o) => o.is_empty(),
  }
}

/// Integer ids, also accepted as integer-valued strings ("12").
fn numeric_id(field: &Map<String, Value>) -> Option<i64> {
  match field.get("id")? {
    Value::Number(n) => n
      .as_i64()
      .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
    Value::String(s) => s.trim().parse::<i64>().ok(),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use mockall::Sequence;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use serde_json::json;

  use crate::completion::{Completion, MockCompletionClient};
  use crate::completion_log::{CompletionLog, FixedClock, MemoryCompletionLog};
  use crate::errors::CompletionError;
  use crate::taxonomy::{DIFFICULTIES, EDUCATION_LEVELS, SUBJECTS};

  const NOW: i64 = 1_700_000_042;

  fn fixed_preselection() -> Preselection {
    Preselection {
      education_level: EDUCATION_LEVELS[3], // High School (4)
      subject: SUBJECTS[1],                 // Science (10)
      difficulty: DIFFICULTIES[1],          // Medium (22)
    }
  }

  fn base_json() -> String {
    json!({
      "subject": {"id": 10, "label": "Science"},
      "education_level": {"id": 4, "label": "High School"},
      "difficulty": {"id": 22, "label": "Medium"},
      "cognitive_goal": {"id": 27, "label": "Analyze"}
    })
    .to_string()
  }

  /// Mock client answering each call in order with the given outcomes.
  fn scripted(responses: Vec<Result<String, CompletionError>>) -> MockCompletionClient {
    let mut mock = MockCompletionClient::new();
    let mut seq = Sequence::new();
    for response in responses {
      let mut slot = Some(response);
      mock
        .expect_complete()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |req| match slot.take() {
          Some(Ok(text)) => Ok(Completion::estimated(&req.prompt, text)),
          Some(Err(e)) => Err(e),
          None => Err(CompletionError::Transport("called twice".into())),
        });
    }
    mock
  }

  fn pipeline(mock: MockCompletionClient) -> (MetadataPipeline, Arc<MemoryCompletionLog>) {
    let log = Arc::new(MemoryCompletionLog::new());
    let completer = Completer::new(Arc::new(mock), log.clone(), Arc::new(FixedClock::at_unix(NOW)));
    (MetadataPipeline::new(GeneratorConfig::default(), Prompts::default(), completer), log)
  }

  #[tokio::test]
  async fn full_run_produces_metadata_within_id_ranges() {
    let mock = scripted(vec![
      Ok(format!("```json\n{}\n```", base_json())),
      Ok("\"Enzyme kinetics in everyday cooking\"".into()),
      Ok("PROMPT: Test how temperature changes enzyme activity.\nTITLE: Enzymes in the Kitchen\n".into()),
    ]);
    let (pipeline, log) = pipeline(mock);

    let meta = pipeline.generate_with_preselection(fixed_preselection()).await.expect("metadata");
    assert_eq!(meta.title, "Enzymes in the Kitchen");
    assert_eq!(meta.prompt, "Test how temperature changes enzyme activity.");
    assert_eq!(meta.base.cognitive_goal, Term { id: 27, label: "Analyze".into() });
    assert!((9..=20).contains(&meta.base.subject.id));
    assert!((1..=8).contains(&meta.base.education_level.id));
    assert!([21, 22, 23].contains(&meta.base.difficulty.id));
    assert!((24..=29).contains(&meta.base.cognitive_goal.id));

    let entries = log.entries().await.expect("entries");
    let kinds: Vec<CompletionKind> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![CompletionKind::BaseMetadata, CompletionKind::Topic, CompletionKind::PromptTitle]);
    assert!(entries[1].request.contains("Cognitive goal: Analyze"));
    assert!(entries[2].request.contains("Topic: Enzyme kinetics in everyday cooking"));
  }

  #[test]
  fn stage_one_prompt_pins_the_preselected_facets() {
    let prompt = build_base_metadata_prompt(&Prompts::default(), &fixed_preselection());
    assert!(prompt.contains(r#"subject: {"id": 10, "label": "Science"}"#));
    assert!(prompt.contains(r#"education_level: {"id": 4, "label": "High School"}"#));
    assert!(prompt.contains(r#"difficulty: {"id": 22, "label": "Medium"}"#));
    assert!(prompt.contains(r#"{"id": 29, "label": "Create"}"#));
    assert!(!prompt.contains("{subject}"));
  }

  #[tokio::test]
  async fn missing_keys_take_the_deterministic_fallback() {
    let mock = scripted(vec![
      Ok(r#"{"subject": {"id": 10, "label": "Science"}, "cognitive_goal": {"id": 25, "label": "Understand"}}"#.into()),
      Ok("Cell structure".into()),
      Ok("PROMPT: Identify organelles.\nTITLE: Inside the Cell".into()),
    ]);
    let (pipeline, _log) = pipeline(mock);

    let meta = pipeline.generate_with_preselection(fixed_preselection()).await.expect("metadata");
    assert_eq!(meta.base, fallback_metadata(NOW));
  }

  #[tokio::test]
  async fn invalid_id_is_a_hard_failure() {
    let mock = scripted(vec![Ok(
      r#"{"subject": {"id": 99, "label": "Alchemy"}, "education_level": {"id": 4, "label": "High School"}, "difficulty": {"id": 22, "label": "Medium"}, "cognitive_goal": {"id": 27, "label": "Analyze"}}"#
        .into(),
    )]);
    let (pipeline, log) = pipeline(mock);

    let err = pipeline.generate_with_preselection(fixed_preselection()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Schema { stage: "base_metadata", .. }), "{err}");
    assert_eq!(log.entries().await.expect("entries").len(), 1);
  }

  #[tokio::test]
  async fn non_json_is_a_parse_failure_not_a_fallback() {
    let mock = scripted(vec![Ok("I think the cognitive goal should be Analyze.".into())]);
    let (pipeline, _log) = pipeline(mock);

    let err = pipeline.generate_with_preselection(fixed_preselection()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Parse { stage: "base_metadata", .. }));
  }

  #[tokio::test]
  async fn topic_transport_failure_aborts_and_logs_only_raw_attempts() {
    let mock = scripted(vec![
      Ok(base_json()),
      Err(CompletionError::Transport("connection reset".into())),
    ]);
    let (pipeline, log) = pipeline(mock);

    let err = pipeline.generate_with_preselection(fixed_preselection()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Transport(_)));

    let entries = log.entries().await.expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, CompletionKind::BaseMetadata);
    assert_eq!(entries[1].kind, CompletionKind::Topic);
    assert!(entries[1].response.starts_with("ERROR:"));
    assert!(entries.iter().all(|e| !e.response.contains("\"title\"")));
  }

  #[tokio::test]
  async fn blank_topic_is_empty_content() {
    let mock = scripted(vec![Ok(base_json()), Ok("  \"\"  ".into())]);
    let (pipeline, _log) = pipeline(mock);

    let err = pipeline.generate_with_preselection(fixed_preselection()).await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyContent { stage: "topic" }));
  }

  #[tokio::test]
  async fn missing_title_line_fails_stage_three() {
    let mock = scripted(vec![
      Ok(base_json()),
      Ok("Photosynthesis".into()),
      Ok("PROMPT: Explain the light reactions.".into()),
    ]);
    let (pipeline, _log) = pipeline(mock);

    let err = pipeline.generate_with_preselection(fixed_preselection()).await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyContent { stage: "prompt_title" }));
  }

  #[test]
  fn empty_values_count_as_missing() {
    let v = json!({
      "subject": {},
      "education_level": {"id": 4, "label": "High School"},
      "difficulty": "",
      "cognitive_goal": null
    });
    let check = check_base_metadata(&v).expect("check");
    assert_eq!(
      check,
      BaseMetadataCheck::Incomplete { missing: vec!["subject", "difficulty", "cognitive_goal"] }
    );
  }

  #[test]
  fn wrong_shapes_are_rejected() {
    let mut v: Value = serde_json::from_str(&base_json()).expect("json");
    v["difficulty"] = json!("Medium");
    assert!(check_base_metadata(&v).unwrap_err().contains("difficulty is not an object"));

    let mut v: Value = serde_json::from_str(&base_json()).expect("json");
    v["cognitive_goal"] = json!({"id": 27, "label": 5});
    assert!(check_base_metadata(&v).unwrap_err().contains("cognitive_goal.label"));

    let mut v: Value = serde_json::from_str(&base_json()).expect("json");
    v["subject"] = json!({"id": "ten", "label": "Science"});
    assert!(check_base_metadata(&v).unwrap_err().contains("subject.id"));
  }

  #[test]
  fn numeric_string_ids_are_accepted() {
    let mut v: Value = serde_json::from_str(&base_json()).expect("json");
    v["subject"] = json!({"id": "10", "label": "Science"});
    match check_base_metadata(&v).expect("check") {
      BaseMetadataCheck::Valid(base) => assert_eq!(base.subject.id, 10),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn seeded_preselection_is_reproducible() {
    let a = preselect(&mut StdRng::seed_from_u64(3));
    let b = preselect(&mut StdRng::seed_from_u64(3));
    assert_eq!(a, b);
  }
}
