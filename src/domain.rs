//! Domain models used by the backend: quiz modes/questions, grading results,
//! session scores, saved materials, and study blueprints.
//!
//! Wire names are camelCase to stay compatible with the web client.

use serde::{Deserialize, Serialize};

/// Which kind of quiz is being run? Determines question shape and scoring rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuizMode {
  #[serde(rename = "Multiple Choice")]
  MultipleChoice,
  #[serde(rename = "Fill in the Gap")]
  FillGap,
  #[serde(rename = "Theory")]
  Theory,
}

impl std::fmt::Display for QuizMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      QuizMode::MultipleChoice => write!(f, "Multiple Choice"),
      QuizMode::FillGap => write!(f, "Fill in the Gap"),
      QuizMode::Theory => write!(f, "Theory"),
    }
  }
}

/// A generated quiz. The mode tag decides which question shape the list holds,
/// so each variant carries only the fields its mode actually requires.
/// Immutable once generated for a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum Quiz {
  #[serde(rename = "Multiple Choice")]
  MultipleChoice { questions: Vec<ChoiceQuestion> },
  #[serde(rename = "Fill in the Gap")]
  FillGap { questions: Vec<GapQuestion> },
  #[serde(rename = "Theory")]
  Theory { questions: Vec<TheoryQuestion> },
}

impl Quiz {
  pub fn mode(&self) -> QuizMode {
    match self {
      Quiz::MultipleChoice { .. } => QuizMode::MultipleChoice,
      Quiz::FillGap { .. } => QuizMode::FillGap,
      Quiz::Theory { .. } => QuizMode::Theory,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      Quiz::MultipleChoice { questions } => questions.len(),
      Quiz::FillGap { questions } => questions.len(),
      Quiz::Theory { questions } => questions.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Multiple-choice question: exactly 4 options, `correct_answer` is an index 0-3.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceQuestion {
  pub question: String,
  pub options: Vec<String>,
  pub correct_answer: usize,
  pub explanation: String,
}

/// Fill-in-the-gap question: `question` contains a ___ placeholder,
/// `correct_answer` the missing word(s).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapQuestion {
  pub question: String,
  pub correct_answer: String,
  pub explanation: String,
}

/// Theory question: no exact answer; graded comparatively by the model.
/// `explanation` holds a model sample answer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TheoryQuestion {
  pub question: String,
  #[serde(default)]
  pub key_concepts: Vec<String>,
  pub explanation: String,
}

/// Result of grading one handwritten or typed theory answer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
  #[serde(default)]
  pub ocr_text: String,
  pub score: f32,
  #[serde(default)]
  pub feedback: String,
  #[serde(default)]
  pub strengths: Vec<String>,
  #[serde(default)]
  pub weaknesses: Vec<String>,
  #[serde(default)]
  pub no_handwriting_detected: bool,
}

/// One recorded answer within a session. At most one per question index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScore {
  pub question_idx: usize,
  pub score: f32,
  pub user_answer: String,
  pub is_correct: bool,
}

/// Final aggregate produced once a session reaches completion.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
  pub average_score: u32,
  pub correct_count: usize,
  pub total_questions: usize,
  pub mode: QuizMode,
  pub scores: Vec<SessionScore>,
}

/// Was a material uploaded as a file or pasted as raw text?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
  File,
  Text,
}

/// A unit of ingested study material, persisted in the bounded local store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMaterial {
  pub id: String,
  pub name: String,
  pub content: String,
  /// Epoch milliseconds.
  pub timestamp: i64,
  #[serde(rename = "type")]
  pub kind: MaterialKind,
}

//
// Study blueprint (study map) types.
//

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
  pub summary: String,
  #[serde(default)]
  pub grand_mnemonic: Option<Mnemonic>,
  #[serde(default)]
  pub chapters: Vec<BlueprintChapter>,
  #[serde(default)]
  pub potential_questions: Vec<PotentialQuestion>,
  #[serde(default)]
  pub key_terms: Vec<KeyTerm>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mnemonic {
  pub acronym: String,
  pub full: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlueprintChapter {
  pub title: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PotentialQuestion {
  pub question: String,
  pub answer_tip: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyTerm {
  pub term: String,
  pub definition: String,
}

/// Per-chapter detail fetched after the initial blueprint, one request per
/// chapter issued concurrently.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDetail {
  #[serde(default)]
  pub key_points: Vec<KeyPoint>,
  #[serde(default)]
  pub mnemonic: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyPoint {
  pub title: String,
  pub content: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quiz_mode_tag_matches_client_wire_names() {
    let quiz = Quiz::FillGap {
      questions: vec![GapQuestion {
        question: "The powerhouse of the cell is ___".into(),
        correct_answer: "mitochondria".into(),
        explanation: "Basic cell biology.".into(),
      }],
    };
    let v = serde_json::to_value(&quiz).unwrap();
    assert_eq!(v["mode"], "Fill in the Gap");
    assert_eq!(v["questions"][0]["correctAnswer"], "mitochondria");
  }

  #[test]
  fn grading_result_accepts_minimal_payload() {
    let r: GradingResult = serde_json::from_str(r#"{"score": 85}"#).unwrap();
    assert_eq!(r.score, 85.0);
    assert!(!r.no_handwriting_detected);
    assert!(r.ocr_text.is_empty());
  }
}
