//! Quiz session state machine.
//!
//! Drives single-question-at-a-time progression through a fixed, ordered
//! question list: `AwaitingAnswer(i)` -> (`Grading(i)` while an external
//! grading call is outstanding) -> `AnswerRecorded(i)` -> `AwaitingAnswer(i+1)`
//! or `Complete`. Exactly one `SessionScore` is recorded per answered question.
//!
//! The machine itself is pure and synchronous. Theory answers need an external
//! grading call, so callers bracket it with `begin_grading` / `record_grading`
//! (or `grading_failed`), which also gives us mutual exclusion: at most one
//! outstanding grading operation per session. `begin_grading` hands out the
//! current attempt epoch; the epoch advances on `restart` and `advance`, so a
//! verdict that arrives after either of those no longer matches and is
//! rejected instead of being recorded against a different attempt.

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{GradingResult, Quiz, SessionScore, SessionSummary};

/// Score at or above which a graded theory answer counts as correct.
pub const PASS_SCORE: f32 = 70.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
  #[error("question {got} is not the active question (expected {expected})")]
  OutOfTurn { expected: usize, got: usize },
  #[error("question {0} already has a recorded answer")]
  AlreadyAnswered(usize),
  #[error("a grading operation is already in progress")]
  GradingInProgress,
  #[error("no grading operation is in progress")]
  NotGrading,
  #[error("answer kind does not match the quiz mode")]
  WrongMode,
  #[error("handwriting retry budget exhausted for this question")]
  RetriesExhausted,
  #[error("the session is already complete")]
  Complete,
  #[error("cannot advance before an answer is recorded")]
  NotAnswered,
  #[error("the session is not complete yet")]
  NotComplete,
}

/// How the user provided a theory answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TheoryInput {
  Handwritten,
  Typed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
  AwaitingAnswer,
  Grading(TheoryInput),
  AnswerRecorded,
  Complete,
}

/// Outcome of feeding a `GradingResult` back into the machine.
#[derive(Clone, Debug)]
pub enum GradingOutcome {
  Recorded(SessionScore),
  /// No handwriting was detected; nothing was recorded and one retry was
  /// consumed. The question is awaiting an answer again.
  RetryHandwriting { retries_left: u8 },
}

/// Result of `advance`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
  Next { question_idx: usize },
  Complete,
}

pub struct QuizSession {
  pub id: String,
  pub quiz: Quiz,
  /// Reference context handed to the grader alongside theory answers.
  pub source_text: String,
  handwriting_retries: u8,
  current: usize,
  phase: Phase,
  retries_left: u8,
  /// Attempt epoch. Incremented on `restart` and `advance` so in-flight
  /// grading verdicts from an earlier attempt cannot be recorded.
  epoch: u64,
  scores: Vec<SessionScore>,
}

impl QuizSession {
  /// A quiz with zero questions (degenerate generation) starts out complete;
  /// its summary reports an average of 0.
  pub fn new(id: String, quiz: Quiz, source_text: String, handwriting_retries: u8) -> Self {
    let phase = if quiz.is_empty() { Phase::Complete } else { Phase::AwaitingAnswer };
    Self {
      id,
      quiz,
      source_text,
      handwriting_retries,
      current: 0,
      phase,
      retries_left: handwriting_retries,
      epoch: 0,
      scores: Vec::new(),
    }
  }

  pub fn question_idx(&self) -> usize {
    self.current
  }

  pub fn answered_count(&self) -> usize {
    self.scores.len()
  }

  pub fn is_complete(&self) -> bool {
    self.phase == Phase::Complete
  }

  pub fn retries_left(&self) -> u8 {
    self.retries_left
  }

  pub fn phase_name(&self) -> &'static str {
    match self.phase {
      Phase::AwaitingAnswer => "awaiting_answer",
      Phase::Grading(_) => "grading",
      Phase::AnswerRecorded => "answer_recorded",
      Phase::Complete => "complete",
    }
  }

  /// Common validity check for all submission entry points.
  fn guard_submit(&self, idx: usize) -> Result<(), SessionError> {
    match self.phase {
      Phase::Complete => Err(SessionError::Complete),
      Phase::Grading(_) => Err(SessionError::GradingInProgress),
      Phase::AnswerRecorded => Err(SessionError::AlreadyAnswered(self.current)),
      Phase::AwaitingAnswer if idx != self.current => {
        Err(SessionError::OutOfTurn { expected: self.current, got: idx })
      }
      Phase::AwaitingAnswer => Ok(()),
    }
  }

  fn record(&mut self, score: f32, user_answer: String, is_correct: bool) -> &SessionScore {
    self.scores.push(SessionScore {
      question_idx: self.current,
      score,
      user_answer,
      is_correct,
    });
    self.phase = Phase::AnswerRecorded;
    debug_assert!(self.scores.len() <= self.quiz.len());
    self.scores.last().expect("just pushed")
  }

  /// Submit a multiple-choice answer. An out-of-range index is simply wrong,
  /// not an error.
  pub fn submit_choice(&mut self, idx: usize, option_idx: usize) -> Result<&SessionScore, SessionError> {
    self.guard_submit(idx)?;
    let q = match &self.quiz {
      Quiz::MultipleChoice { questions } => &questions[self.current],
      _ => return Err(SessionError::WrongMode),
    };
    let is_correct = option_idx == q.correct_answer;
    let user_answer = q
      .options
      .get(option_idx)
      .cloned()
      .unwrap_or_else(|| option_idx.to_string());
    info!(target: "session", id = %self.id, idx, option_idx, is_correct, "choice answer recorded");
    Ok(self.record(if is_correct { 100.0 } else { 0.0 }, user_answer, is_correct))
  }

  /// Submit a fill-gap answer. Comparison is case-insensitive and trimmed.
  pub fn submit_gap(&mut self, idx: usize, text: &str) -> Result<&SessionScore, SessionError> {
    self.guard_submit(idx)?;
    let q = match &self.quiz {
      Quiz::FillGap { questions } => &questions[self.current],
      _ => return Err(SessionError::WrongMode),
    };
    let is_correct =
      crate::util::normalize_answer(text) == crate::util::normalize_answer(&q.correct_answer);
    info!(target: "session", id = %self.id, idx, is_correct, "gap answer recorded");
    Ok(self.record(if is_correct { 100.0 } else { 0.0 }, text.trim().to_string(), is_correct))
  }

  /// Enter the grading sub-state for the active theory question and return
  /// the attempt epoch the verdict must carry. Rejected when another grading
  /// call is outstanding, and for handwritten input once the no-handwriting
  /// retry budget is used up.
  pub fn begin_grading(&mut self, idx: usize, input: TheoryInput) -> Result<u64, SessionError> {
    self.guard_submit(idx)?;
    if !matches!(self.quiz, Quiz::Theory { .. }) {
      return Err(SessionError::WrongMode);
    }
    if input == TheoryInput::Handwritten && self.retries_left == 0 {
      return Err(SessionError::RetriesExhausted);
    }
    self.phase = Phase::Grading(input);
    debug!(target: "session", id = %self.id, idx, ?input, epoch = self.epoch, "grading started");
    Ok(self.epoch)
  }

  /// Feed the external grader's verdict back in. A verdict from a stale
  /// attempt epoch is rejected. A no-handwriting verdict consumes one retry
  /// and leaves the question unanswered; anything else records exactly one
  /// score with `is_correct = score >= 70`.
  pub fn record_grading(
    &mut self,
    idx: usize,
    epoch: u64,
    result: GradingResult,
  ) -> Result<GradingOutcome, SessionError> {
    if !matches!(self.phase, Phase::Grading(_)) || idx != self.current || epoch != self.epoch {
      return Err(SessionError::NotGrading);
    }
    if result.no_handwriting_detected {
      self.retries_left = self.retries_left.saturating_sub(1);
      self.phase = Phase::AwaitingAnswer;
      info!(target: "session", id = %self.id, idx, retries_left = self.retries_left, "no handwriting detected; retry consumed");
      return Ok(GradingOutcome::RetryHandwriting { retries_left: self.retries_left });
    }
    let score = result.score.clamp(0.0, 100.0);
    let is_correct = score >= PASS_SCORE;
    let user_answer = if result.ocr_text.trim().is_empty() {
      "Written answer".to_string()
    } else {
      result.ocr_text.clone()
    };
    info!(target: "session", id = %self.id, idx, score = %format!("{:.1}", score), is_correct, "graded answer recorded");
    Ok(GradingOutcome::Recorded(self.record(score, user_answer, is_correct).clone()))
  }

  /// The external grading call failed; return to `AwaitingAnswer` so the same
  /// submission can be retried. Nothing is recorded. A stale attempt epoch is
  /// a no-op so a failed call cannot cancel a later attempt's grading.
  pub fn grading_failed(&mut self, idx: usize, epoch: u64) {
    if matches!(self.phase, Phase::Grading(_)) && idx == self.current && epoch == self.epoch {
      self.phase = Phase::AwaitingAnswer;
      debug!(target: "session", id = %self.id, idx, "grading failed; question awaiting answer again");
    }
  }

  /// Move past a recorded answer. Clears per-question transient state
  /// (the handwriting retry budget resets for the next question).
  pub fn advance(&mut self) -> Result<Advance, SessionError> {
    match self.phase {
      Phase::Complete => Err(SessionError::Complete),
      Phase::Grading(_) => Err(SessionError::GradingInProgress),
      Phase::AwaitingAnswer => Err(SessionError::NotAnswered),
      Phase::AnswerRecorded => {
        self.epoch += 1;
        if self.current + 1 >= self.quiz.len() {
          self.phase = Phase::Complete;
          info!(target: "session", id = %self.id, answered = self.scores.len(), "session complete");
          Ok(Advance::Complete)
        } else {
          self.current += 1;
          self.retries_left = self.handwriting_retries;
          self.phase = Phase::AwaitingAnswer;
          Ok(Advance::Next { question_idx: self.current })
        }
      }
    }
  }

  /// Discard the whole session: valid from any state, back to question 0 with
  /// an empty score list.
  pub fn restart(&mut self) {
    self.scores.clear();
    self.current = 0;
    self.retries_left = self.handwriting_retries;
    self.epoch += 1;
    self.phase = if self.quiz.is_empty() { Phase::Complete } else { Phase::AwaitingAnswer };
    info!(target: "session", id = %self.id, "session restarted");
  }

  /// Final aggregate; only available once the session is complete.
  pub fn summary(&self) -> Result<SessionSummary, SessionError> {
    if self.phase != Phase::Complete {
      return Err(SessionError::NotComplete);
    }
    let average_score = if self.scores.is_empty() {
      0
    } else {
      let mean = self.scores.iter().map(|s| s.score).sum::<f32>() / self.scores.len() as f32;
      mean.round() as u32
    };
    Ok(SessionSummary {
      average_score,
      correct_count: self.scores.iter().filter(|s| s.is_correct).count(),
      total_questions: self.quiz.len(),
      mode: self.quiz.mode(),
      scores: self.scores.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ChoiceQuestion, GapQuestion, QuizMode, TheoryQuestion};

  fn mcq_quiz() -> Quiz {
    Quiz::MultipleChoice {
      questions: (0..3)
        .map(|i| ChoiceQuestion {
          question: format!("Question {i}"),
          options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
          correct_answer: i % 4,
          explanation: "Because.".into(),
        })
        .collect(),
    }
  }

  fn gap_quiz() -> Quiz {
    Quiz::FillGap {
      questions: vec![GapQuestion {
        question: "The powerhouse of the cell is ___".into(),
        correct_answer: "mitochondria".into(),
        explanation: "Cell biology.".into(),
      }],
    }
  }

  fn theory_quiz() -> Quiz {
    Quiz::Theory {
      questions: vec![TheoryQuestion {
        question: "Explain osmosis.".into(),
        key_concepts: vec!["diffusion".into(), "membrane".into()],
        explanation: "Movement of water across a semi-permeable membrane.".into(),
      }],
    }
  }

  fn session(quiz: Quiz) -> QuizSession {
    QuizSession::new("s1".into(), quiz, "source".into(), 2)
  }

  fn graded(score: f32) -> GradingResult {
    GradingResult {
      ocr_text: "an answer".into(),
      score,
      feedback: "ok".into(),
      strengths: vec![],
      weaknesses: vec![],
      no_handwriting_detected: false,
    }
  }

  fn no_handwriting() -> GradingResult {
    GradingResult { no_handwriting_detected: true, ..graded(0.0) }
  }

  #[test]
  fn mcq_full_run_all_correct() {
    let mut s = session(mcq_quiz());
    for i in 0..3 {
      let score = s.submit_choice(i, i % 4).unwrap();
      assert!(score.is_correct);
      assert_eq!(score.score, 100.0);
      s.advance().unwrap();
    }
    assert!(s.is_complete());
    let sum = s.summary().unwrap();
    assert_eq!(sum.average_score, 100);
    assert_eq!(sum.correct_count, 3);
    assert_eq!(sum.total_questions, 3);
    assert_eq!(sum.mode, QuizMode::MultipleChoice);
  }

  #[test]
  fn mcq_wrong_and_out_of_range_answers_score_zero() {
    let mut s = session(mcq_quiz());
    let score = s.submit_choice(0, 3).unwrap(); // correct is 0
    assert!(!score.is_correct);
    assert_eq!(score.score, 0.0);
    s.advance().unwrap();
    let score = s.submit_choice(1, 17).unwrap();
    assert!(!score.is_correct);
  }

  #[test]
  fn double_submit_is_rejected_and_records_nothing_extra() {
    let mut s = session(mcq_quiz());
    s.submit_choice(0, 0).unwrap();
    assert_eq!(s.submit_choice(0, 1), Err(SessionError::AlreadyAnswered(0)));
    assert_eq!(s.answered_count(), 1);
  }

  #[test]
  fn out_of_turn_submit_is_rejected() {
    let mut s = session(mcq_quiz());
    assert_eq!(
      s.submit_choice(2, 0),
      Err(SessionError::OutOfTurn { expected: 0, got: 2 })
    );
  }

  #[test]
  fn gap_matching_ignores_case_and_whitespace() {
    let mut s = session(gap_quiz());
    let score = s.submit_gap(0, "Mitochondria ").unwrap();
    assert!(score.is_correct);
    assert_eq!(score.score, 100.0);
    assert_eq!(score.user_answer, "Mitochondria");
  }

  #[test]
  fn mode_mismatch_is_rejected() {
    let mut s = session(gap_quiz());
    assert_eq!(s.submit_choice(0, 1), Err(SessionError::WrongMode));
    let mut s = session(mcq_quiz());
    assert_eq!(s.begin_grading(0, TheoryInput::Typed), Err(SessionError::WrongMode));
  }

  #[test]
  fn theory_pass_threshold_defines_correctness() {
    for (score, expect) in [(69.9, false), (70.0, true), (100.0, true), (0.0, false)] {
      let mut s = session(theory_quiz());
      let e = s.begin_grading(0, TheoryInput::Typed).unwrap();
      match s.record_grading(0, e, graded(score)).unwrap() {
        GradingOutcome::Recorded(rec) => assert_eq!(rec.is_correct, expect, "score {score}"),
        other => panic!("unexpected outcome: {other:?}"),
      }
    }
  }

  #[test]
  fn grading_scores_are_clamped_into_range() {
    let mut s = session(theory_quiz());
    let e = s.begin_grading(0, TheoryInput::Typed).unwrap();
    match s.record_grading(0, e, graded(140.0)).unwrap() {
      GradingOutcome::Recorded(rec) => assert_eq!(rec.score, 100.0),
      other => panic!("unexpected outcome: {other:?}"),
    }
  }

  #[test]
  fn concurrent_submissions_are_rejected_while_grading() {
    let mut s = session(theory_quiz());
    s.begin_grading(0, TheoryInput::Handwritten).unwrap();
    assert_eq!(s.begin_grading(0, TheoryInput::Typed), Err(SessionError::GradingInProgress));
    assert_eq!(s.advance(), Err(SessionError::GradingInProgress));
  }

  #[test]
  fn grading_failure_leaves_question_awaiting_answer() {
    let mut s = session(theory_quiz());
    let e = s.begin_grading(0, TheoryInput::Typed).unwrap();
    s.grading_failed(0, e);
    assert_eq!(s.phase_name(), "awaiting_answer");
    assert_eq!(s.answered_count(), 0);
    // The same submission can be retried.
    let e = s.begin_grading(0, TheoryInput::Typed).unwrap();
    s.record_grading(0, e, graded(80.0)).unwrap();
    assert_eq!(s.answered_count(), 1);
  }

  #[test]
  fn no_handwriting_twice_exhausts_budget_and_leaves_question_unanswered() {
    let mut s = session(theory_quiz());
    for expected_left in [1u8, 0u8] {
      let e = s.begin_grading(0, TheoryInput::Handwritten).unwrap();
      match s.record_grading(0, e, no_handwriting()).unwrap() {
        GradingOutcome::RetryHandwriting { retries_left } => {
          assert_eq!(retries_left, expected_left)
        }
        other => panic!("unexpected outcome: {other:?}"),
      }
    }
    // Budget gone: further handwritten attempts are blocked, nothing recorded.
    assert_eq!(
      s.begin_grading(0, TheoryInput::Handwritten),
      Err(SessionError::RetriesExhausted)
    );
    assert_eq!(s.answered_count(), 0);
    assert_eq!(s.phase_name(), "awaiting_answer");
    // A typed answer is still accepted.
    let e = s.begin_grading(0, TheoryInput::Typed).unwrap();
    s.record_grading(0, e, graded(55.0)).unwrap();
    assert_eq!(s.answered_count(), 1);
  }

  #[test]
  fn verdict_from_before_a_restart_is_rejected() {
    let mut s = session(theory_quiz());
    let stale = s.begin_grading(0, TheoryInput::Typed).unwrap();
    s.restart();
    let fresh = s.begin_grading(0, TheoryInput::Typed).unwrap();
    // The first attempt's verdict lands after the restart: it must not be
    // recorded as the new attempt's answer.
    assert_eq!(
      s.record_grading(0, stale, graded(95.0)).unwrap_err(),
      SessionError::NotGrading
    );
    assert_eq!(s.answered_count(), 0);
    // A stale failure notification cannot cancel the new attempt either.
    s.grading_failed(0, stale);
    assert_eq!(s.phase_name(), "grading");
    // The current attempt's verdict still records normally.
    s.record_grading(0, fresh, graded(95.0)).unwrap();
    assert_eq!(s.answered_count(), 1);
  }

  #[test]
  fn retry_budget_resets_on_advance() {
    let quiz = Quiz::Theory {
      questions: vec![
        TheoryQuestion { question: "q0".into(), key_concepts: vec![], explanation: "e".into() },
        TheoryQuestion { question: "q1".into(), key_concepts: vec![], explanation: "e".into() },
      ],
    };
    let mut s = session(quiz);
    let e = s.begin_grading(0, TheoryInput::Handwritten).unwrap();
    s.record_grading(0, e, no_handwriting()).unwrap();
    assert_eq!(s.retries_left(), 1);
    let e = s.begin_grading(0, TheoryInput::Typed).unwrap();
    s.record_grading(0, e, graded(90.0)).unwrap();
    s.advance().unwrap();
    assert_eq!(s.retries_left(), 2);
  }

  #[test]
  fn restart_resets_from_any_state() {
    let mut s = session(mcq_quiz());
    s.submit_choice(0, 0).unwrap();
    s.advance().unwrap();
    s.restart();
    assert_eq!(s.question_idx(), 0);
    assert_eq!(s.answered_count(), 0);
    assert_eq!(s.phase_name(), "awaiting_answer");

    let mut s = session(theory_quiz());
    s.begin_grading(0, TheoryInput::Typed).unwrap();
    s.restart();
    assert_eq!(s.phase_name(), "awaiting_answer");

    // From Complete as well.
    let mut s = session(gap_quiz());
    s.submit_gap(0, "nope").unwrap();
    assert_eq!(s.advance().unwrap(), Advance::Complete);
    s.restart();
    assert!(!s.is_complete());
    assert_eq!(s.answered_count(), 0);
  }

  #[test]
  fn advance_requires_a_recorded_answer() {
    let mut s = session(mcq_quiz());
    assert_eq!(s.advance(), Err(SessionError::NotAnswered));
  }

  #[test]
  fn zero_question_quiz_is_complete_with_zero_average() {
    let s = session(Quiz::Theory { questions: vec![] });
    assert!(s.is_complete());
    let sum = s.summary().unwrap();
    assert_eq!(sum.average_score, 0);
    assert_eq!(sum.correct_count, 0);
    assert_eq!(sum.total_questions, 0);
  }

  #[test]
  fn summary_unavailable_before_completion() {
    let s = session(mcq_quiz());
    assert!(matches!(s.summary(), Err(SessionError::NotComplete)));
  }

  #[test]
  fn mixed_results_average_is_rounded_mean() {
    let mut s = session(mcq_quiz());
    s.submit_choice(0, 0).unwrap(); // correct -> 100
    s.advance().unwrap();
    s.submit_choice(1, 3).unwrap(); // wrong -> 0
    s.advance().unwrap();
    s.submit_choice(2, 2).unwrap(); // correct -> 100
    s.advance().unwrap();
    let sum = s.summary().unwrap();
    assert_eq!(sum.average_score, 67); // mean 66.67 rounds to 67
    assert_eq!(sum.correct_count, 2);
  }
}
