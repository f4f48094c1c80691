//! Fixed taxonomy vocabularies (subject, education level, difficulty, cognitive goal)
//! and the local, non-AI selection logic built on them.
//!
//! Flow:
//! 1) `preselect` draws level → subject → difficulty before any model call.
//! 2) The model only picks the cognitive goal; its answer is checked against these tables.
//! 3) `fallback_metadata` gives a deterministic tuple when the answer omits fields.

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::{BaseMetadata, Term};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TermDef {
  pub id: i64,
  pub label: &'static str,
}

impl TermDef {
  pub fn to_term(self) -> Term {
    Term { id: self.id, label: self.label.to_string() }
  }
}

macro_rules! term {
  ($id:expr, $label:expr) => {
    TermDef { id: $id, label: $label }
  };
}

pub const SUBJECTS: &[TermDef] = &[
  term!(9, "Mathematics"),
  term!(10, "Science"),
  term!(11, "History"),
  term!(12, "Geography"),
  term!(13, "Language & Literature"),
  term!(14, "Arts"),
  term!(15, "Computer Science"),
  term!(16, "Economics"),
  term!(17, "Philosophy"),
  term!(18, "Law"),
  term!(19, "Education"),
  term!(20, "Professional Studies"),
];

pub const EDUCATION_LEVELS: &[TermDef] = &[
  term!(1, "Early Childhood"),
  term!(2, "Primary School"),
  term!(3, "Middle School"),
  term!(4, "High School"),
  term!(5, "Undergraduate"),
  term!(6, "Graduate"),
  term!(7, "Professional"),
  term!(8, "Lifelong Learning"),
];

pub const DIFFICULTIES: &[TermDef] = &[
  term!(21, "Easy"),
  term!(22, "Medium"),
  term!(23, "Hard"),
];

/// Easy:Medium:Hard, aligned with `DIFFICULTIES`.
pub const DIFFICULTY_WEIGHTS: [u32; 3] = [1, 4, 1];

pub const COGNITIVE_GOALS: &[TermDef] = &[
  term!(24, "Remember"),
  term!(25, "Understand"),
  term!(26, "Apply"),
  term!(27, "Analyze"),
  term!(28, "Evaluate"),
  term!(29, "Create"),
];

// Subjects that only make sense past the early levels.
const LAW: i64 = 18;
const EDUCATION: i64 = 19;
const PROFESSIONAL_STUDIES: i64 = 20;
const ECONOMICS: i64 = 16;
const PHILOSOPHY: i64 = 17;

/// One of the four BaseMetadata facets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Facet {
  Subject,
  EducationLevel,
  Difficulty,
  CognitiveGoal,
}

impl Facet {
  pub const ALL: [Facet; 4] = [
    Facet::Subject,
    Facet::EducationLevel,
    Facet::Difficulty,
    Facet::CognitiveGoal,
  ];

  /// Key used in the model's JSON answer.
  pub fn key(self) -> &'static str {
    match self {
      Facet::Subject => "subject",
      Facet::EducationLevel => "education_level",
      Facet::Difficulty => "difficulty",
      Facet::CognitiveGoal => "cognitive_goal",
    }
  }

  pub fn options(self) -> &'static [TermDef] {
    match self {
      Facet::Subject => SUBJECTS,
      Facet::EducationLevel => EDUCATION_LEVELS,
      Facet::Difficulty => DIFFICULTIES,
      Facet::CognitiveGoal => COGNITIVE_GOALS,
    }
  }

  pub fn valid_ids(self) -> Vec<i64> {
    self.options().iter().map(|t| t.id).collect()
  }

  pub fn contains(self, id: i64) -> bool {
    self.options().iter().any(|t| t.id == id)
  }
}

/// Facets fixed locally before the model is asked for the cognitive goal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preselection {
  pub education_level: TermDef,
  pub subject: TermDef,
  pub difficulty: TermDef,
}

/// Subjects offered at a given education level.
pub fn subjects_for_level(level_id: i64) -> Vec<TermDef> {
  let excluded: &[i64] = match level_id {
    1 => &[LAW, EDUCATION, PROFESSIONAL_STUDIES, ECONOMICS, PHILOSOPHY],
    2 | 3 => &[LAW, EDUCATION, PROFESSIONAL_STUDIES],
    _ => &[],
  };
  SUBJECTS
    .iter()
    .filter(|s| !excluded.contains(&s.id))
    .copied()
    .collect()
}

/// Weighted difficulty draw (Medium four times as likely as Easy or Hard).
pub fn pick_difficulty<R: Rng + ?Sized>(rng: &mut R) -> TermDef {
  match WeightedIndex::new(DIFFICULTY_WEIGHTS) {
    Ok(dist) => DIFFICULTIES[dist.sample(rng)],
    // Weights are constant and non-zero; Medium is the heaviest option anyway.
    Err(_) => DIFFICULTIES[1],
  }
}

pub fn preselect<R: Rng + ?Sized>(rng: &mut R) -> Preselection {
  let education_level = *EDUCATION_LEVELS
    .choose(rng)
    .unwrap_or(&EDUCATION_LEVELS[0]);
  let pool = subjects_for_level(education_level.id);
  let subject = *pool.choose(rng).unwrap_or(&SUBJECTS[0]);
  let difficulty = pick_difficulty(rng);

  Preselection { education_level, subject, difficulty }
}

/// Deterministic local substitute for an incomplete model answer.
/// Every facet uses `(unix_secs mod 100) mod len(options)`.
pub fn fallback_metadata(unix_secs: i64) -> BaseMetadata {
  let seed = unix_secs.rem_euclid(100) as usize;
  let pick = |facet: Facet| {
    let options = facet.options();
    options[seed % options.len()].to_term()
  };

  BaseMetadata {
    subject: pick(Facet::Subject),
    education_level: pick(Facet::EducationLevel),
    difficulty: pick(Facet::Difficulty),
    cognitive_goal: pick(Facet::CognitiveGoal),
  }
}
