//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Material save/ingest (length gate, extraction, bounded store)
//!   - Quiz generation behind the usage gate, creating a session
//!   - Answer submission, including the async theory-grading bracket
//!   - Session advance/restart/summary
//!   - Blueprint generation and the per-chapter fan-out
//!
//! State mutation only happens after a successful external response; failures
//! leave sessions and stores exactly as they were.

use base64::Engine;
use futures::future::join_all;
use tracing::{error, info, instrument, warn};

use crate::domain::{MaterialKind, Quiz, SavedMaterial};
use crate::error::ApiError;
use crate::extract::{extract_text, DocumentFormat};
use crate::gemini::Gemini;
use crate::protocol::{
  AdvanceOut, AnswerIn, AnswerOut, BlueprintOut, ChapterDetailsOut, IngestIn, IngestOut, QuizOut,
  SessionStateOut,
};
use crate::session::{Advance, GradingOutcome, QuizSession, TheoryInput};
use crate::state::AppState;
use uuid::Uuid;

/// Save manually pasted text as a material. Pasted text (unlike file-derived
/// text) must clear the minimum-length gate.
#[instrument(level = "info", skip(state, text), fields(text_len = text.len()))]
pub async fn save_pasted_material(
  state: &AppState,
  text: &str,
  name: Option<String>,
) -> Result<SavedMaterial, ApiError> {
  if text.trim().chars().count() < state.limits.min_pasted_chars {
    return Err(ApiError::BadRequest(format!(
      "please provide at least {} characters of material",
      state.limits.min_pasted_chars
    )));
  }
  let name = name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| derive_name(text));
  Ok(state.materials.save(text.to_string(), name, MaterialKind::Text).await)
}

/// Derive a display name from the first characters of pasted text.
fn derive_name(text: &str) -> String {
  let head: String = text.chars().take(30).collect();
  let head = head.trim();
  if head.is_empty() {
    "Untitled Note".to_string()
  } else if text.chars().count() > 30 {
    format!("{}...", head)
  } else {
    head.to_string()
  }
}

/// Decode, extract, and save an uploaded document. All-or-nothing: no material
/// is created when extraction fails. Empty extracted text still succeeds.
#[instrument(level = "info", skip(state, body), fields(file_name = %body.file_name))]
pub async fn ingest_document(state: &AppState, body: IngestIn) -> Result<IngestOut, ApiError> {
  let format = DocumentFormat::detect(body.mime.as_deref(), &body.file_name)?;
  let bytes = base64::engine::general_purpose::STANDARD
    .decode(crate::util::strip_data_url(&body.data_base64))
    .map_err(|e| ApiError::BadRequest(format!("invalid base64 payload: {e}")))?;
  let text = extract_text(format, &bytes)?;
  let text_len = text.len();
  let material = state.materials.save(text, body.file_name, MaterialKind::File).await;
  info!(target: "sulva_backend", id = %material.id, text_len, "Document ingested");
  Ok(IngestOut { material, text_len })
}

/// Generate a quiz for the given source text and open a fresh session on it.
/// The usage gate runs (and the action is counted) before the model is called.
#[instrument(level = "info", skip(state, source_text), fields(%user_id, %mode, count, source_len = source_text.len()))]
pub async fn generate_quiz(
  state: &AppState,
  user_id: &str,
  source_text: &str,
  mode: crate::domain::QuizMode,
  count: u32,
) -> Result<QuizOut, ApiError> {
  if count == 0 || count > state.limits.max_questions {
    return Err(ApiError::BadRequest(format!(
      "count must be between 1 and {}",
      state.limits.max_questions
    )));
  }
  if source_text.trim().is_empty() {
    return Err(ApiError::BadRequest("source text is empty".into()));
  }
  let gemini = require_gemini(state)?;
  consume_generation(state, user_id).await?;

  let quiz = gemini
    .generate_quiz(&state.prompts, &state.limits, source_text, mode, count)
    .await
    .map_err(ApiError::Upstream)?;

  let session_id = Uuid::new_v4().to_string();
  let session = QuizSession::new(
    session_id.clone(),
    quiz.clone(),
    source_text.to_string(),
    state.limits.handwriting_retries,
  );
  state.sessions.write().await.insert(session_id.clone(), session);
  let remaining_today = state.quota.remaining(user_id).await;
  info!(target: "session", %session_id, questions = quiz.len(), "Session opened");
  Ok(QuizOut { session_id, quiz, remaining_today })
}

/// Generate a study blueprint. Counts against the same daily allowance as
/// quiz generation.
#[instrument(level = "info", skip(state, source_text), fields(%user_id, source_len = source_text.len()))]
pub async fn generate_blueprint(
  state: &AppState,
  user_id: &str,
  source_text: &str,
) -> Result<BlueprintOut, ApiError> {
  if source_text.trim().is_empty() {
    return Err(ApiError::BadRequest("source text is empty".into()));
  }
  let gemini = require_gemini(state)?;
  consume_generation(state, user_id).await?;
  let blueprint = gemini
    .generate_blueprint(&state.prompts, &state.limits, source_text)
    .await
    .map_err(ApiError::Upstream)?;
  Ok(BlueprintOut { blueprint })
}

/// Fetch detail for every chapter at once: all requests are issued together
/// and we wait for all to settle, tolerating individual failures.
#[instrument(level = "info", skip(state, source_text, chapters), fields(chapter_count = chapters.len()))]
pub async fn chapter_details(
  state: &AppState,
  source_text: &str,
  chapters: &[String],
) -> Result<ChapterDetailsOut, ApiError> {
  let gemini = require_gemini(state)?;
  let futures = chapters
    .iter()
    .map(|title| gemini.chapter_detail(&state.prompts, &state.limits, title, source_text));
  let results = join_all(futures).await;
  let chapters = results
    .into_iter()
    .zip(chapters)
    .map(|(res, title)| match res {
      Ok(detail) => Some(detail),
      Err(e) => {
        warn!(target: "sulva_backend", %title, error = %e, "Chapter detail failed; returning null for it");
        None
      }
    })
    .collect();
  Ok(ChapterDetailsOut { chapters })
}

/// Submit one answer to a session. Objective modes resolve synchronously;
/// theory answers bracket an external grading call so the session stays in its
/// grading sub-state (rejecting concurrent submissions) until it settles.
#[instrument(level = "info", skip(state, answer), fields(%session_id))]
pub async fn submit_answer(
  state: &AppState,
  session_id: &str,
  answer: AnswerIn,
) -> Result<AnswerOut, ApiError> {
  match answer {
    AnswerIn::Choice { question_idx, option_idx } => {
      let mut sessions = state.sessions.write().await;
      let session = sessions
        .get_mut(session_id)
        .ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))?;
      let score = session.submit_choice(question_idx, option_idx)?.clone();
      let explanation = explanation_for(&session.quiz, question_idx);
      Ok(AnswerOut::Recorded { score, explanation, grading: None })
    }
    AnswerIn::Gap { question_idx, text } => {
      let mut sessions = state.sessions.write().await;
      let session = sessions
        .get_mut(session_id)
        .ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))?;
      let score = session.submit_gap(question_idx, &text)?.clone();
      let explanation = explanation_for(&session.quiz, question_idx);
      Ok(AnswerOut::Recorded { score, explanation, grading: None })
    }
    AnswerIn::TheoryTyped { question_idx, text } => {
      grade_theory(state, session_id, question_idx, TheoryInput::Typed, move |g, p, l, q, ctx| {
        Box::pin(async move { g.grade_typed(&p, &l, &text, &q, &ctx).await })
      })
      .await
    }
    AnswerIn::TheoryImage { question_idx, image_base64 } => {
      grade_theory(
        state,
        session_id,
        question_idx,
        TheoryInput::Handwritten,
        move |g, p, l, q, ctx| {
          Box::pin(async move { g.grade_handwritten(&p, &l, &image_base64, &q, &ctx).await })
        },
      )
      .await
    }
  }
}

type GradeFuture = std::pin::Pin<
  Box<dyn std::future::Future<Output = Result<crate::domain::GradingResult, String>> + Send>,
>;

/// The grading bracket: mark the session as grading, run the external call
/// without holding the lock, then feed the verdict (or the failure) back in.
async fn grade_theory<F>(
  state: &AppState,
  session_id: &str,
  question_idx: usize,
  input: TheoryInput,
  call: F,
) -> Result<AnswerOut, ApiError>
where
  F: FnOnce(Gemini, crate::config::Prompts, crate::config::Limits, String, String) -> GradeFuture,
{
  let gemini = require_gemini(state)?.clone();

  // Enter the grading sub-state and copy out what the grader needs. The
  // attempt epoch ties the verdict to this attempt in case the session is
  // restarted while the call is in flight.
  let (attempt, question, explanation, context) = {
    let mut sessions = state.sessions.write().await;
    let session = sessions
      .get_mut(session_id)
      .ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))?;
    let attempt = session.begin_grading(question_idx, input)?;
    let q = match &session.quiz {
      Quiz::Theory { questions } => &questions[question_idx],
      _ => unreachable!("begin_grading checked the mode"),
    };
    (attempt, q.question.clone(), q.explanation.clone(), session.source_text.clone())
  };

  let result =
    match call(gemini, state.prompts.clone(), state.limits.clone(), question, context).await {
      Ok(result) => result,
      Err(e) => {
        error!(target: "session", %session_id, question_idx, error = %e, "Grading call failed; question stays open");
        if let Some(session) = state.sessions.write().await.get_mut(session_id) {
          session.grading_failed(question_idx, attempt);
        }
        return Err(ApiError::Upstream(e));
      }
    };

  let mut sessions = state.sessions.write().await;
  let session = sessions
    .get_mut(session_id)
    .ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))?;
  match session.record_grading(question_idx, attempt, result.clone())? {
    GradingOutcome::Recorded(score) => {
      Ok(AnswerOut::Recorded { score, explanation, grading: Some(result) })
    }
    GradingOutcome::RetryHandwriting { retries_left } => {
      Ok(AnswerOut::RetryHandwriting { retries_left, grading: result })
    }
  }
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn advance(state: &AppState, session_id: &str) -> Result<AdvanceOut, ApiError> {
  let mut sessions = state.sessions.write().await;
  let session = sessions
    .get_mut(session_id)
    .ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))?;
  match session.advance()? {
    Advance::Next { question_idx } => Ok(AdvanceOut::Next { question_idx }),
    Advance::Complete => Ok(AdvanceOut::Complete { summary: session.summary()? }),
  }
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn restart(state: &AppState, session_id: &str) -> Result<SessionStateOut, ApiError> {
  let mut sessions = state.sessions.write().await;
  let session = sessions
    .get_mut(session_id)
    .ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))?;
  session.restart();
  Ok(session_state_out(session))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn summary(
  state: &AppState,
  session_id: &str,
) -> Result<crate::domain::SessionSummary, ApiError> {
  let sessions = state.sessions.read().await;
  let session = sessions
    .get(session_id)
    .ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))?;
  Ok(session.summary()?)
}

fn require_gemini(state: &AppState) -> Result<&Gemini, ApiError> {
  state.gemini.as_ref().ok_or(ApiError::AiDisabled)
}

/// The action is counted atomically before the model call, so a free user
/// cannot farm failed generations past the limit and concurrent requests
/// cannot both take the last slot.
async fn consume_generation(state: &AppState, user_id: &str) -> Result<(), ApiError> {
  if user_id.trim().is_empty() {
    return Err(ApiError::BadRequest("userId is required".into()));
  }
  state
    .quota
    .try_consume(user_id)
    .await
    .map_err(|q| ApiError::QuotaExceeded(q.limit))
}

fn explanation_for(quiz: &Quiz, idx: usize) -> String {
  match quiz {
    Quiz::MultipleChoice { questions } => {
      questions.get(idx).map(|q| q.explanation.clone()).unwrap_or_default()
    }
    Quiz::FillGap { questions } => {
      questions.get(idx).map(|q| q.explanation.clone()).unwrap_or_default()
    }
    Quiz::Theory { questions } => {
      questions.get(idx).map(|q| q.explanation.clone()).unwrap_or_default()
    }
  }
}

pub fn session_state_out(session: &QuizSession) -> SessionStateOut {
  SessionStateOut {
    session_id: session.id.clone(),
    phase: session.phase_name(),
    question_idx: session.question_idx(),
    answered: session.answered_count(),
    total: session.quiz.len(),
  }
}
