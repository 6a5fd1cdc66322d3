use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use crate::database::Database;
use crate::document_registry::DocumentRegistry;
use crate::errors::LearningError;
use crate::generation_gateway::SharedBackend;
use crate::models::{
    ChatMessage, ChatSender, Flashcard, Note, Quiz, QuizOptions, QuizQuestion, QuizType,
    RecentItem, RecentKind, SaveNoteRequest, SharedQuiz, SourceDocument, StoreEvent,
};
use crate::{log_store_operation, log_validation};

const COMPONENT: &str = "artifact_store";
const EVENT_CAPACITY: usize = 128;

/// Item count requested when the caller does not choose one
pub const DEFAULT_GENERATION_COUNT: u32 = 5;

#[derive(Debug, Default)]
struct Artifacts {
    flashcards: Vec<Flashcard>,
    quizzes: Vec<SharedQuiz>,
    notes: Vec<Note>,
    chat: Vec<ChatMessage>,
}

/// Flashcards, quizzes, notes and chat derived from registered documents.
///
/// Only flashcards are persisted; every flashcard mutation rewrites the full
/// list to local storage and is rolled back in memory if that write fails.
#[derive(Clone)]
pub struct ArtifactStore {
    backend: SharedBackend,
    registry: DocumentRegistry,
    db: Database,
    artifacts: Arc<RwLock<Artifacts>>,
    persist_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<StoreEvent>,
}

impl ArtifactStore {
    /// Open the store, reviving any flashcards saved by a previous run
    pub async fn open(backend: SharedBackend, registry: DocumentRegistry, db: Database) -> Self {
        let flashcards = db.load_flashcards().await;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            registry,
            db,
            artifacts: Arc::new(RwLock::new(Artifacts {
                flashcards,
                ..Artifacts::default()
            })),
            persist_lock: Arc::new(Mutex::new(())),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Artifacts> {
        self.artifacts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Artifacts> {
        self.artifacts.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    fn require_document(&self, document_id: &str) -> Result<SourceDocument, LearningError> {
        self.registry
            .lookup(document_id)
            .ok_or_else(|| LearningError::not_found("Document", document_id))
    }

    /// Apply `change` to the flashcard list and persist the result.
    /// `None` from `change` means nothing changed and nothing is written.
    async fn mutate_flashcards<R, F>(
        &self,
        operation: &str,
        change: F,
    ) -> Result<Option<R>, LearningError>
    where
        F: FnOnce(&mut Vec<Flashcard>) -> Option<R> + Send,
        R: Send,
    {
        let _persist = self.persist_lock.lock().await;

        let (previous, snapshot, outcome) = {
            let mut artifacts = self.write();
            let previous = artifacts.flashcards.clone();
            match change(&mut artifacts.flashcards) {
                Some(outcome) => (previous, artifacts.flashcards.clone(), outcome),
                None => return Ok(None),
            }
        };

        if let Err(e) = self.db.save_flashcards(&snapshot).await {
            log_store_operation!(error, COMPONENT, operation, error = e);
            self.write().flashcards = previous;
            return Err(e);
        }

        self.notify(StoreEvent::FlashcardsChanged);
        Ok(Some(outcome))
    }

    // ------------------------------------------------------------------
    // Flashcards
    // ------------------------------------------------------------------

    pub async fn add_flashcard(
        &self,
        document_id: &str,
        front: &str,
        back: &str,
    ) -> Result<Flashcard, LearningError> {
        self.require_document(document_id)?;
        self.insert_flashcard(document_id, front, back).await
    }

    async fn insert_flashcard(
        &self,
        document_id: &str,
        front: &str,
        back: &str,
    ) -> Result<Flashcard, LearningError> {
        let card = Flashcard {
            id: Uuid::new_v4(),
            source_document_id: document_id.to_string(),
            front: front.to_string(),
            back: back.to_string(),
            created_at: Utc::now(),
            last_viewed_at: None,
        };
        let inserted = card.clone();
        self.mutate_flashcards("add_flashcard", move |cards| {
            cards.push(inserted);
            Some(())
        })
        .await?;
        Ok(card)
    }

    /// Generate cards and insert them one at a time. Cards with a blank side
    /// are skipped; the call fails only when nothing usable came back.
    pub async fn generate_flashcards(
        &self,
        document_id: &str,
        count: u32,
    ) -> Result<Vec<Flashcard>, LearningError> {
        log_store_operation!(start, COMPONENT, "generate_flashcards", document_id = document_id);
        self.require_document(document_id)?;
        if count == 0 {
            return Err(LearningError::InvalidInput(
                "at least one flashcard must be requested".to_string(),
            ));
        }

        let generated = self
            .backend
            .generate_flashcards(document_id, count)
            .await
            .map_err(LearningError::generation)?;
        if generated.is_empty() {
            return Err(LearningError::generation(LearningError::Validation(
                "no flashcards were generated".to_string(),
            )));
        }

        let mut inserted = Vec::with_capacity(generated.len());
        for (index, card) in generated.iter().enumerate() {
            if card.front.trim().is_empty() || card.back.trim().is_empty() {
                log_store_operation!(
                    warn,
                    COMPONENT,
                    "generate_flashcards",
                    format!("skipping generated card #{} with a blank side", index + 1)
                );
                continue;
            }
            inserted.push(
                self.insert_flashcard(document_id, &card.front, &card.back)
                    .await?,
            );
        }

        if inserted.is_empty() {
            return Err(LearningError::generation(LearningError::Validation(
                "every generated flashcard was blank".to_string(),
            )));
        }

        log_store_operation!(
            success,
            COMPONENT,
            "generate_flashcards",
            document_id = document_id,
            count = inserted.len()
        );
        Ok(inserted)
    }

    /// Remove a flashcard. Unknown ids are a no-op and return `false`.
    pub async fn delete_flashcard(&self, flashcard_id: Uuid) -> Result<bool, LearningError> {
        let removed = self
            .mutate_flashcards("delete_flashcard", |cards| {
                let index = cards.iter().position(|card| card.id == flashcard_id)?;
                cards.remove(index);
                Some(())
            })
            .await?;
        Ok(removed.is_some())
    }

    /// Stamp `last_viewed_at` when a card is studied
    pub async fn mark_flashcard_viewed(
        &self,
        flashcard_id: Uuid,
    ) -> Result<Flashcard, LearningError> {
        let now = Utc::now();
        self.mutate_flashcards("mark_flashcard_viewed", |cards| {
            let card = cards.iter_mut().find(|card| card.id == flashcard_id)?;
            card.last_viewed_at = Some(now);
            Some(card.clone())
        })
        .await?
        .ok_or_else(|| LearningError::not_found("Flashcard", flashcard_id))
    }

    pub fn flashcards(&self) -> Vec<Flashcard> {
        self.read().flashcards.clone()
    }

    pub fn flashcards_by_document(&self, document_id: &str) -> Vec<Flashcard> {
        self.read()
            .flashcards
            .iter()
            .filter(|card| card.source_document_id == document_id)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Quizzes
    // ------------------------------------------------------------------

    /// Generate and store a quiz. Nothing is stored unless every question
    /// has an answer key that matches its own options.
    pub async fn generate_quiz(
        &self,
        document_id: &str,
        count: u32,
        options: &QuizOptions,
    ) -> Result<SharedQuiz, LearningError> {
        log_store_operation!(start, COMPONENT, "generate_quiz", document_id = document_id);
        let document = self.require_document(document_id)?;
        if count == 0 {
            return Err(LearningError::InvalidInput(
                "at least one question must be requested".to_string(),
            ));
        }

        let generated = self
            .backend
            .generate_quiz(document_id, count, options)
            .await
            .map_err(LearningError::generation)?;

        let title = format!("{} - {} Quiz", document.title, generated.quiz_type.label());
        let quiz = build_quiz(document_id, title, generated.quiz_type, generated.questions)
            .map_err(LearningError::generation)?;

        log_store_operation!(
            success,
            COMPONENT,
            "generate_quiz",
            document_id = document_id,
            count = quiz.questions.len()
        );
        Ok(self.store_quiz(quiz))
    }

    /// Store a hand-built quiz under the same rules as a generated one
    pub fn add_quiz(
        &self,
        document_id: &str,
        title: &str,
        quiz_type: QuizType,
        questions: Vec<QuizQuestion>,
    ) -> Result<SharedQuiz, LearningError> {
        self.require_document(document_id)?;
        let quiz = build_quiz(document_id, title.to_string(), quiz_type, questions)?;
        Ok(self.store_quiz(quiz))
    }

    fn store_quiz(&self, quiz: Quiz) -> SharedQuiz {
        let quiz = Arc::new(quiz);
        self.write().quizzes.push(Arc::clone(&quiz));
        self.notify(StoreEvent::QuizzesChanged);
        quiz
    }

    pub fn get_quiz(&self, quiz_id: Uuid) -> Option<SharedQuiz> {
        self.read()
            .quizzes
            .iter()
            .find(|quiz| quiz.id == quiz_id)
            .cloned()
    }

    pub fn delete_quiz(&self, quiz_id: Uuid) -> bool {
        let removed = {
            let mut artifacts = self.write();
            let before = artifacts.quizzes.len();
            artifacts.quizzes.retain(|quiz| quiz.id != quiz_id);
            before != artifacts.quizzes.len()
        };
        if removed {
            self.notify(StoreEvent::QuizzesChanged);
        }
        removed
    }

    pub fn quizzes(&self) -> Vec<SharedQuiz> {
        self.read().quizzes.clone()
    }

    pub fn quizzes_by_document(&self, document_id: &str) -> Vec<SharedQuiz> {
        self.read()
            .quizzes
            .iter()
            .filter(|quiz| quiz.source_document_id == document_id)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    pub async fn generate_notes(&self, document_id: &str) -> Result<Note, LearningError> {
        log_store_operation!(start, COMPONENT, "generate_notes", document_id = document_id);
        let document = self.require_document(document_id)?;

        let content = self
            .backend
            .generate_notes(document_id)
            .await
            .map_err(LearningError::generation)?;
        if content.trim().is_empty() {
            return Err(LearningError::generation(LearningError::Validation(
                "generated notes are empty".to_string(),
            )));
        }

        let note = self.store_note(document_id, format!("Notes: {}", document.title), content);
        log_store_operation!(success, COMPONENT, "generate_notes", document_id = document_id, count = 1);
        Ok(note)
    }

    pub fn add_note(
        &self,
        document_id: &str,
        title: &str,
        content: &str,
    ) -> Result<Note, LearningError> {
        self.require_document(document_id)?;
        if content.trim().is_empty() {
            return Err(LearningError::InvalidInput("note content is empty".to_string()));
        }
        Ok(self.store_note(document_id, title.to_string(), content.to_string()))
    }

    fn store_note(&self, document_id: &str, title: String, content: String) -> Note {
        let note = Note {
            id: Uuid::new_v4(),
            source_document_id: document_id.to_string(),
            title,
            content,
            created_at: Utc::now(),
        };
        self.write().notes.push(note.clone());
        self.notify(StoreEvent::NotesChanged);
        note
    }

    pub fn get_note(&self, note_id: Uuid) -> Option<Note> {
        self.read().notes.iter().find(|note| note.id == note_id).cloned()
    }

    pub fn delete_note(&self, note_id: Uuid) -> bool {
        let removed = {
            let mut artifacts = self.write();
            let before = artifacts.notes.len();
            artifacts.notes.retain(|note| note.id != note_id);
            before != artifacts.notes.len()
        };
        if removed {
            self.notify(StoreEvent::NotesChanged);
        }
        removed
    }

    pub fn notes(&self) -> Vec<Note> {
        self.read().notes.clone()
    }

    pub fn notes_by_document(&self, document_id: &str) -> Vec<Note> {
        self.read()
            .notes
            .iter()
            .filter(|note| note.source_document_id == document_id)
            .cloned()
            .collect()
    }

    /// Save a local note to the backend's notes collection
    pub async fn publish_note(&self, note_id: Uuid) -> Result<Value, LearningError> {
        let note = self
            .get_note(note_id)
            .ok_or_else(|| LearningError::not_found("Note", note_id))?;
        self.backend
            .save_note(&SaveNoteRequest {
                title: note.title,
                content: note.content,
                source_text: String::new(),
            })
            .await
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    pub fn record_chat_message(
        &self,
        document_id: Option<&str>,
        sender: ChatSender,
        text: &str,
    ) -> ChatMessage {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            source_document_id: document_id.map(str::to_string),
            sender,
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        self.write().chat.push(message.clone());
        self.notify(StoreEvent::ChatAppended {
            message_id: message.id,
        });
        message
    }

    /// Messages bound to `document_id`, or unbound messages for `None`, in append order
    pub fn chat_history(&self, document_id: Option<&str>) -> Vec<ChatMessage> {
        self.read()
            .chat
            .iter()
            .filter(|message| message.source_document_id.as_deref() == document_id)
            .cloned()
            .collect()
    }

    /// Ask a question about a document. Both turns are recorded only when
    /// the backend answers.
    pub async fn ask(&self, document_id: &str, text: &str) -> Result<ChatMessage, LearningError> {
        self.require_document(document_id)?;
        if text.trim().is_empty() {
            return Err(LearningError::InvalidInput("message is empty".to_string()));
        }

        let reply = self.backend.send_chat_message(document_id, text).await?;

        self.record_chat_message(Some(document_id), ChatSender::User, text);
        Ok(self.record_chat_message(Some(document_id), ChatSender::Assistant, &reply))
    }

    pub async fn recent(&self, kind: RecentKind) -> Result<Vec<RecentItem>, LearningError> {
        self.backend.recent(kind).await
    }
}

/// Assemble a quiz after checking every question's answer key
fn build_quiz(
    document_id: &str,
    title: String,
    quiz_type: QuizType,
    questions: Vec<QuizQuestion>,
) -> Result<Quiz, LearningError> {
    if questions.is_empty() {
        let error = LearningError::Validation("quiz has no questions".to_string());
        log_validation!(failure, COMPONENT, error = error);
        return Err(error);
    }
    if let Some(reason) = questions.iter().find_map(|q| q.validate().err()) {
        let error = LearningError::Validation(reason);
        log_validation!(failure, COMPONENT, error = error);
        return Err(error);
    }
    log_validation!(success, COMPONENT, format!("{} questions validated", questions.len()));

    Ok(Quiz {
        id: Uuid::new_v4(),
        source_document_id: document_id.to_string(),
        title,
        quiz_type,
        questions,
        created_at: Utc::now(),
    })
}
