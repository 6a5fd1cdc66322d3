use serde::{Deserialize, Serialize};

use crate::errors::LearningError;
use crate::models::{QuizQuestion, SharedQuiz};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    InProgress,
    Completed,
}

/// Outcome of one question in a scored session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub prompt: String,
    pub given_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizScore {
    pub correct: usize,
    pub total: usize,
    pub percentage: f64,
    pub rounded_percent: u32,
    pub results: Vec<QuestionResult>,
}

/// One play-through of a quiz.
///
/// The session stores and compares answers as plain strings, so every
/// question variant runs through the same transitions. `answers` always has
/// one slot per question and `current_index` always points at a question.
#[derive(Debug, Clone)]
pub struct QuizSession {
    quiz: SharedQuiz,
    current_index: usize,
    answers: Vec<String>,
    state: SessionState,
}

impl QuizSession {
    pub fn new(quiz: SharedQuiz) -> Result<Self, LearningError> {
        if quiz.questions.is_empty() {
            return Err(LearningError::InvalidInput(format!(
                "quiz '{}' has no questions",
                quiz.id
            )));
        }
        let answers = vec![String::new(); quiz.questions.len()];
        Ok(Self {
            quiz,
            current_index: 0,
            answers,
            state: SessionState::InProgress,
        })
    }

    pub fn quiz(&self) -> &SharedQuiz {
        &self.quiz
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    fn last_index(&self) -> usize {
        self.answers.len() - 1
    }

    pub fn current_question(&self) -> &QuizQuestion {
        &self.quiz.questions[self.current_index]
    }

    /// Whether a view should let the learner move on: the current question
    /// has a non-empty answer. `next` itself does not enforce this.
    pub fn can_advance(&self) -> bool {
        self.state == SessionState::InProgress && !self.answers[self.current_index].is_empty()
    }

    /// Record an answer for the current question. Ignored once completed.
    pub fn answer(&mut self, text: impl Into<String>) -> bool {
        if self.state != SessionState::InProgress {
            return false;
        }
        self.answers[self.current_index] = text.into();
        true
    }

    /// Move forward; on the last question this completes the session instead.
    pub fn next(&mut self) -> SessionState {
        if self.state == SessionState::InProgress {
            if self.current_index < self.last_index() {
                self.current_index += 1;
            } else {
                self.state = SessionState::Completed;
            }
        }
        self.state
    }

    pub fn previous(&mut self) -> bool {
        if self.state != SessionState::InProgress || self.current_index == 0 {
            return false;
        }
        self.current_index -= 1;
        true
    }

    pub fn reset(&mut self) {
        self.answers.iter_mut().for_each(String::clear);
        self.current_index = 0;
        self.state = SessionState::InProgress;
    }

    /// Exact string comparison against each answer key; no partial credit.
    pub fn score(&self) -> Result<QuizScore, LearningError> {
        if self.state != SessionState::Completed {
            return Err(LearningError::SessionNotCompleted);
        }

        let results: Vec<QuestionResult> = self
            .quiz
            .questions
            .iter()
            .zip(&self.answers)
            .map(|(question, given)| QuestionResult {
                question_id: question.id.clone(),
                prompt: question.prompt.clone(),
                given_answer: given.clone(),
                correct_answer: question.correct_answer.clone(),
                is_correct: *given == question.correct_answer,
            })
            .collect();

        let total = results.len();
        let correct = results.iter().filter(|r| r.is_correct).count();
        let percentage = correct as f64 * 100.0 / total as f64;

        Ok(QuizScore {
            correct,
            total,
            percentage,
            rounded_percent: percentage.round() as u32,
            results,
        })
    }
}
