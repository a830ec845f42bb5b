//! Minimal Gemini client for our use-cases.
//!
//! We only call generateContent and always request a strict JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes
//! (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to
//! avoid PII leaks.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::{Limits, Prompts};
use crate::domain::{
  Blueprint, ChapterDetail, ChoiceQuestion, GapQuestion, GradingResult, Quiz, QuizMode,
  TheoryQuestion,
};
use crate::util::{fill_template, truncate_chars};

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl Gemini {
  /// Construct the client if we find GEMINI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok()?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let model =
      std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-3-flash-preview".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model })
  }

  /// JSON-object generateContent call. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, parts), fields(model = %self.model))]
  async fn generate_json<T: for<'a> Deserialize<'a>>(
    &self,
    system: &str,
    parts: Vec<Part>,
    temperature: f32,
  ) -> Result<T, String> {
    let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
    let req = GenerateContentRequest {
      system_instruction: Some(Content { parts: vec![Part::text(system)] }),
      contents: vec![Content { parts }],
      generation_config: GenerationConfig {
        response_mime_type: "application/json".into(),
        temperature,
      },
    };

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "sulva-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(&req)
      .send()
      .await
      .map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_gemini_error(&body).unwrap_or(body);
      return Err(format!("Gemini HTTP {}: {}", status, msg));
    }

    let body: GenerateContentResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage_metadata {
      info!(
        prompt_tokens = ?usage.prompt_token_count,
        candidate_tokens = ?usage.candidates_token_count,
        total_tokens = ?usage.total_token_count,
        "Gemini usage"
      );
    }
    let text = body
      .candidates
      .first()
      .and_then(|c| c.content.parts.first())
      .and_then(|p| p.text.clone())
      .unwrap_or_default();

    serde_json::from_str::<T>(&text).map_err(|e| format!("JSON parse error: {}", e))
  }

  // --- High-level helpers (domain-specialized) ---

  /// Generate a quiz from source text. The source is truncated before sending.
  #[instrument(
    level = "info",
    skip(self, prompts, limits, source),
    fields(%mode, count, source_len = source.len())
  )]
  pub async fn generate_quiz(
    &self,
    prompts: &Prompts,
    limits: &Limits,
    source: &str,
    mode: QuizMode,
    count: u32,
  ) -> Result<Quiz, String> {
    let shape = match mode {
      QuizMode::MultipleChoice => &prompts.mcq_shape_hint,
      QuizMode::FillGap => &prompts.gap_shape_hint,
      QuizMode::Theory => &prompts.theory_shape_hint,
    };
    let system = fill_template(
      &prompts.quiz_system_template,
      &[("count", &count.to_string()), ("mode", &mode.to_string()), ("shape", shape)],
    );
    let user = fill_template(
      &prompts.quiz_user_template,
      &[("source", truncate_chars(source, limits.max_source_chars))],
    );

    let start = std::time::Instant::now();
    let quiz = match mode {
      QuizMode::MultipleChoice => {
        let raw: RawQuestions<ChoiceQuestion> =
          self.generate_json(&system, vec![Part::text(&user)], 0.9).await?;
        Quiz::MultipleChoice { questions: raw.questions }
      }
      QuizMode::FillGap => {
        let raw: RawQuestions<GapQuestion> =
          self.generate_json(&system, vec![Part::text(&user)], 0.9).await?;
        Quiz::FillGap { questions: raw.questions }
      }
      QuizMode::Theory => {
        let raw: RawQuestions<TheoryQuestion> =
          self.generate_json(&system, vec![Part::text(&user)], 0.9).await?;
        Quiz::Theory { questions: raw.questions }
      }
    };
    let elapsed = start.elapsed();

    validate_quiz(&quiz)?;
    info!(?elapsed, questions = quiz.len(), "Quiz generated");
    Ok(quiz)
  }

  /// Grade a photographed handwritten answer.
  #[instrument(
    level = "info",
    skip(self, prompts, limits, image_base64, question, context),
    fields(image_len = image_base64.len(), question_len = question.len())
  )]
  pub async fn grade_handwritten(
    &self,
    prompts: &Prompts,
    limits: &Limits,
    image_base64: &str,
    question: &str,
    context: &str,
  ) -> Result<GradingResult, String> {
    let user = fill_template(
      &prompts.grading_image_template,
      &[("question", question), ("context", truncate_chars(context, limits.grading_context_chars))],
    );
    let parts = vec![
      Part::inline_image("image/jpeg", crate::util::strip_data_url(image_base64)),
      Part::text(&user),
    ];
    let result: GradingResult =
      self.generate_json(&prompts.grading_system, parts, 0.2).await?;
    Ok(clamp_grading(result))
  }

  /// Grade a typed theory answer.
  #[instrument(
    level = "info",
    skip(self, prompts, limits, answer, question, context),
    fields(answer_len = answer.len(), question_len = question.len())
  )]
  pub async fn grade_typed(
    &self,
    prompts: &Prompts,
    limits: &Limits,
    answer: &str,
    question: &str,
    context: &str,
  ) -> Result<GradingResult, String> {
    let user = fill_template(
      &prompts.grading_typed_template,
      &[
        ("answer", answer),
        ("question", question),
        ("context", truncate_chars(context, limits.grading_context_chars)),
      ],
    );
    let result: GradingResult = self
      .generate_json(&prompts.grading_system, vec![Part::text(&user)], 0.2)
      .await?;
    Ok(clamp_grading(result))
  }

  /// Generate a study blueprint (study map) from source text.
  #[instrument(level = "info", skip(self, prompts, limits, source), fields(source_len = source.len()))]
  pub async fn generate_blueprint(
    &self,
    prompts: &Prompts,
    limits: &Limits,
    source: &str,
  ) -> Result<Blueprint, String> {
    let user = fill_template(
      &prompts.blueprint_user_template,
      &[("source", truncate_chars(source, limits.blueprint_source_chars))],
    );
    self.generate_json(&prompts.blueprint_system, vec![Part::text(&user)], 0.7).await
  }

  /// Expand one blueprint chapter into key points and a mnemonic.
  #[instrument(level = "info", skip(self, prompts, limits, source), fields(%title))]
  pub async fn chapter_detail(
    &self,
    prompts: &Prompts,
    limits: &Limits,
    title: &str,
    source: &str,
  ) -> Result<ChapterDetail, String> {
    let user = fill_template(
      &prompts.chapter_user_template,
      &[("title", title), ("source", truncate_chars(source, limits.blueprint_source_chars))],
    );
    self.generate_json(&prompts.chapter_system, vec![Part::text(&user)], 0.7).await
  }
}

/// Shape checks on a freshly generated quiz. A zero-question quiz is allowed
/// (the session layer treats it as immediately complete); malformed
/// multiple-choice entries are not.
pub fn validate_quiz(quiz: &Quiz) -> Result<(), String> {
  if let Quiz::MultipleChoice { questions } = quiz {
    for (i, q) in questions.iter().enumerate() {
      if q.options.len() != 4 {
        return Err(format!("question {} has {} options, expected 4", i, q.options.len()));
      }
      if q.correct_answer >= q.options.len() {
        return Err(format!("question {} has correctAnswer out of range", i));
      }
    }
  }
  Ok(())
}

fn clamp_grading(mut result: GradingResult) -> GradingResult {
  result.score = result.score.clamp(0.0, 100.0);
  if result.no_handwriting_detected {
    result.score = 0.0;
  }
  result
}

#[derive(Deserialize)]
struct RawQuestions<Q> {
  #[serde(default = "Vec::new")]
  questions: Vec<Q>,
}

// --- generateContent DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<Content>,
  contents: Vec<Content>,
  generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
  parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
  #[serde(skip_serializing_if = "Option::is_none")]
  text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  inline_data: Option<InlineData>,
}

impl Part {
  fn text(s: &str) -> Self {
    Self { text: Some(s.to_string()), inline_data: None }
  }

  fn inline_image(mime_type: &str, data_base64: &str) -> Self {
    Self {
      text: None,
      inline_data: Some(InlineData {
        mime_type: mime_type.to_string(),
        data: data_base64.to_string(),
      }),
    }
  }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
  mime_type: String,
  data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  response_mime_type: String,
  temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
  #[serde(default)]
  usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
  content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
  #[serde(default)]
  text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)]
  prompt_token_count: Option<u32>,
  #[serde(default)]
  candidates_token_count: Option<u32>,
  #[serde(default)]
  total_token_count: Option<u32>,
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
