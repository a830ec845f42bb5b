//! Loading study configuration (prompts + tunable limits) from TOML.
//!
//! See `StudyConfig`, `Prompts` and `Limits` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct StudyConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub limits: Limits,
}

/// Prompts used by the Gemini client. Defaults mirror the hosted proxy
/// functions; override them in TOML if you need to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Quiz generation
  pub quiz_system_template: String,
  pub quiz_user_template: String,
  pub mcq_shape_hint: String,
  pub gap_shape_hint: String,
  pub theory_shape_hint: String,
  // Answer grading
  pub grading_system: String,
  pub grading_image_template: String,
  pub grading_typed_template: String,
  // Study blueprint
  pub blueprint_system: String,
  pub blueprint_user_template: String,
  pub chapter_system: String,
  pub chapter_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      quiz_system_template: "You are an expert tutor. Create exactly {count} high-quality questions based on the provided text. Mode: {mode}.\n{shape}\nCRITICAL INSTRUCTION FOR MULTIPLE CHOICE: randomize the position of the correct answer and keep an even distribution of correct indices (0, 1, 2 and 3).\nRespond ONLY with strict JSON: {\"questions\": [...]}. Do not mention your model name or provider in the content.".into(),
      quiz_user_template: "Material to analyze: {source}".into(),
      mcq_shape_hint: "Each question object has: question (string), options (array of exactly 4 strings), correctAnswer (integer index 0-3), explanation (string).".into(),
      gap_shape_hint: "Each question object has: question (a sentence with ___ for the gap), correctAnswer (the correct missing word(s), string), explanation (string).".into(),
      theory_shape_hint: "Each question object has: question (string), keyConcepts (array of strings), explanation (a model sample answer, string).".into(),
      grading_system: "You are a strict but encouraging examiner. Respond ONLY with strict JSON: {\"ocrText\": string, \"score\": number 0-100, \"feedback\": string, \"strengths\": [string], \"weaknesses\": [string], \"noHandwritingDetected\": boolean}. If the image is blank, blurry or contains no readable handwritten text, set noHandwritingDetected to true and score to 0.".into(),
      grading_image_template: "Analyze this image of a handwritten answer.\nReference material: {context}\nQuestion: {question}\nTranscribe the handwriting, assign a score (0-100) against the reference material, and provide feedback.".into(),
      grading_typed_template: "Grade this typed answer: \"{answer}\"\nQuestion: {question}\nReference material: {context}\nSet noHandwritingDetected to false and ocrText to the typed answer verbatim.".into(),
      blueprint_system: "You are a fast educational mapper and mnemonic expert. Respond ONLY with strict JSON: {\"summary\": string, \"grandMnemonic\": {\"acronym\": string, \"full\": string}, \"chapters\": [{\"title\": string}], \"potentialQuestions\": [{\"question\": string, \"answerTip\": string}], \"keyTerms\": [{\"term\": string, \"definition\": string}]}.".into(),
      blueprint_user_template: "Create a study map for: {source}".into(),
      chapter_system: "You expand one chapter of a study map. Respond ONLY with strict JSON: {\"keyPoints\": [{\"title\": string, \"content\": string}], \"mnemonic\": string}.".into(),
      chapter_user_template: "Chapter: {title}\nSource material: {source}".into(),
    }
  }
}

/// Tunable limits. Defaults reproduce the hosted application's behavior.
#[derive(Clone, Debug, Deserialize)]
pub struct Limits {
  /// Free-tier generations per user per UTC day.
  #[serde(default = "default_daily_free_quota")]
  pub daily_free_quota: u32,
  /// Source text truncation before quiz generation.
  #[serde(default = "default_max_source_chars")]
  pub max_source_chars: usize,
  /// Reference-context truncation for grading calls.
  #[serde(default = "default_grading_context_chars")]
  pub grading_context_chars: usize,
  /// Source text truncation before blueprint generation.
  #[serde(default = "default_blueprint_source_chars")]
  pub blueprint_source_chars: usize,
  /// Upper bound on requested question count.
  #[serde(default = "default_max_questions")]
  pub max_questions: u32,
  /// Minimum length for manually pasted material. File-derived text is exempt.
  #[serde(default = "default_min_pasted_chars")]
  pub min_pasted_chars: usize,
  /// Capacity of the saved-material store.
  #[serde(default = "default_max_materials")]
  pub max_materials: usize,
  /// No-handwriting retries allowed per theory question.
  #[serde(default = "default_handwriting_retries")]
  pub handwriting_retries: u8,
}

fn default_daily_free_quota() -> u32 { 3 }
fn default_max_source_chars() -> usize { 15_000 }
fn default_grading_context_chars() -> usize { 5_000 }
fn default_blueprint_source_chars() -> usize { 10_000 }
fn default_max_questions() -> u32 { 50 }
fn default_min_pasted_chars() -> usize { 50 }
fn default_max_materials() -> usize { 10 }
fn default_handwriting_retries() -> u8 { 2 }

impl Default for Limits {
  fn default() -> Self {
    // Serde would fill each field the same way; this keeps non-TOML callers honest.
    toml::from_str("").expect("empty limits table deserializes")
  }
}

/// Attempt to load `StudyConfig` from STUDY_CONFIG_PATH. On any parsing/IO
/// error, returns None and the defaults apply.
pub fn load_study_config_from_env() -> Option<StudyConfig> {
  let path = std::env::var("STUDY_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<StudyConfig>(&s) {
      Ok(cfg) => {
        info!(target: "sulva_backend", %path, "Loaded study config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "sulva_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "sulva_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
