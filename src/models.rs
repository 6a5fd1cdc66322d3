use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Literal answers offered for every true/false question.
pub const TRUE_FALSE_OPTIONS: [&str; 2] = ["true", "false"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    Pdf,
    Video,
}

/// A source the learner studies from. Ids are opaque and assigned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDocument {
    pub id: String,
    pub title: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub kind: DocumentKind,
}

impl SourceDocument {
    /// Local pseudo-document for a video source; never sent to the backend list.
    pub fn video(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            uploaded_at: Utc::now(),
            kind: DocumentKind::Video,
        }
    }
}

/// File handed to `DocumentRegistry::upload`.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn pdf(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: "application/pdf".to_string(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flashcard {
    pub id: Uuid,
    pub source_document_id: String,
    pub front: String,
    pub back: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_viewed_at: Option<DateTime<Utc>>,
}

/// Structural kind of a quiz question. Only multiple choice carries its own options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionVariant {
    MultipleChoice { options: Vec<String> },
    TrueFalse,
    FillInBlank,
}

impl QuestionVariant {
    pub fn name(&self) -> &'static str {
        match self {
            QuestionVariant::MultipleChoice { .. } => "multiple_choice",
            QuestionVariant::TrueFalse => "true_false",
            QuestionVariant::FillInBlank => "fill_in_blank",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizQuestion {
    pub id: String,
    pub prompt: String,
    #[serde(flatten)]
    pub variant: QuestionVariant,
    pub correct_answer: String,
}

impl QuizQuestion {
    /// Candidate answers a view should offer, or `None` for free-text questions.
    pub fn answer_choices(&self) -> Option<Vec<String>> {
        match &self.variant {
            QuestionVariant::MultipleChoice { options } => Some(options.clone()),
            QuestionVariant::TrueFalse => {
                Some(TRUE_FALSE_OPTIONS.iter().map(|s| s.to_string()).collect())
            }
            QuestionVariant::FillInBlank => None,
        }
    }

    /// Checks the answer key against the question's own options.
    pub fn validate(&self) -> Result<(), String> {
        if self.correct_answer.trim().is_empty() {
            return Err(format!("question '{}' has no correct answer", self.id));
        }
        match self.answer_choices() {
            Some(choices) if !choices.iter().any(|c| c == &self.correct_answer) => Err(format!(
                "correct answer of question '{}' is not one of its options",
                self.id
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    #[default]
    MultipleChoice,
    TrueFalse,
    FillInBlank,
    Mixed,
}

impl QuizType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "multiple_choice" => Some(QuizType::MultipleChoice),
            "true_false" => Some(QuizType::TrueFalse),
            "fill_in_blank" => Some(QuizType::FillInBlank),
            "mixed" => Some(QuizType::Mixed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuizType::MultipleChoice => "multiple_choice",
            QuizType::TrueFalse => "true_false",
            QuizType::FillInBlank => "fill_in_blank",
            QuizType::Mixed => "mixed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QuizType::MultipleChoice => "Multiple Choice",
            QuizType::TrueFalse => "True/False",
            QuizType::FillInBlank => "Fill in the Blank",
            QuizType::Mixed => "Mixed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizOptions {
    #[serde(default)]
    pub quiz_type: QuizType,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "English".to_string()
}

impl Default for QuizOptions {
    fn default() -> Self {
        Self {
            quiz_type: QuizType::default(),
            difficulty: Difficulty::default(),
            language: default_language(),
        }
    }
}

/// Immutable once stored; regenerating produces a new quiz.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quiz {
    pub id: Uuid,
    pub source_document_id: String,
    pub title: String,
    pub quiz_type: QuizType,
    pub questions: Vec<QuizQuestion>,
    pub created_at: DateTime<Utc>,
}

pub type SharedQuiz = Arc<Quiz>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: Uuid,
    pub source_document_id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatSender {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub source_document_id: Option<String>,
    pub sender: ChatSender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Flashcard content as returned by generation, before it becomes a stored card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedFlashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuiz {
    pub quiz_type: QuizType,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecentKind {
    Quizzes,
    Flashcards,
    Notes,
}

impl RecentKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            RecentKind::Quizzes => "recent-quizzes",
            RecentKind::Flashcards => "recent-flashcards",
            RecentKind::Notes => "recent-notes",
        }
    }
}

/// Summary row from the backend's recent-activity listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentItem {
    pub id: String,
    pub title: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveNoteRequest {
    pub title: String,
    pub content: String,
    pub source_text: String,
}

/// Notification sent to registry subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    DocumentsChanged { count: usize },
    RefreshFailed { message: String },
}

/// Notification sent to artifact store subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    FlashcardsChanged,
    QuizzesChanged,
    NotesChanged,
    ChatAppended { message_id: Uuid },
}

impl fmt::Display for ChatSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatSender::User => write!(f, "user"),
            ChatSender::Assistant => write!(f, "assistant"),
        }
    }
}
