#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use study_session::{
    ArtifactStore, Database, DocumentRegistry, DocumentUpload, GeneratedFlashcard, GeneratedQuiz,
    LearningBackend, LearningError, QuestionVariant, QuizOptions, QuizQuestion, QuizType,
    RecentItem, RecentKind, SaveNoteRequest, SourceDocument,
};

/// `Err` replies become a backend 500 with that message
pub type Reply<T> = Result<T, String>;

struct ScriptedList {
    documents: Vec<SourceDocument>,
    gate: Option<oneshot::Receiver<()>>,
}

/// In-process stand-in for the learning backend
pub struct FakeBackend {
    documents: Mutex<Vec<SourceDocument>>,
    list_script: Mutex<VecDeque<ScriptedList>>,
    list_failure: Mutex<Option<String>>,
    delete_failure: Mutex<Option<String>>,
    upload_reply: Mutex<Reply<String>>,
    flashcards_reply: Mutex<Reply<Vec<GeneratedFlashcard>>>,
    quiz_reply: Mutex<Reply<GeneratedQuiz>>,
    notes_reply: Mutex<Reply<String>>,
    chat_reply: Mutex<Reply<String>>,
    saved_notes: Mutex<Vec<SaveNoteRequest>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

fn transport(message: String) -> LearningError {
    LearningError::Transport {
        status: Some(500),
        message,
    }
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            documents: Mutex::new(Vec::new()),
            list_script: Mutex::new(VecDeque::new()),
            list_failure: Mutex::new(None),
            delete_failure: Mutex::new(None),
            upload_reply: Mutex::new(Ok("1".to_string())),
            flashcards_reply: Mutex::new(Ok(Vec::new())),
            quiz_reply: Mutex::new(Ok(GeneratedQuiz {
                quiz_type: QuizType::MultipleChoice,
                questions: Vec::new(),
            })),
            notes_reply: Mutex::new(Ok(String::new())),
            chat_reply: Mutex::new(Ok("It is about cells.".to_string())),
            saved_notes: Mutex::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_documents(documents: Vec<SourceDocument>) -> Arc<Self> {
        let backend = Self::new();
        backend.set_documents(documents);
        backend
    }

    pub fn set_documents(&self, documents: Vec<SourceDocument>) {
        *self.documents.lock().unwrap() = documents;
    }

    /// Queue a one-off list response, optionally held until `gate` fires
    pub fn script_list(&self, documents: Vec<SourceDocument>, gate: Option<oneshot::Receiver<()>>) {
        self.list_script
            .lock()
            .unwrap()
            .push_back(ScriptedList { documents, gate });
    }

    pub fn fail_list(&self, message: Option<&str>) {
        *self.list_failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn fail_delete(&self, message: Option<&str>) {
        *self.delete_failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn reply_upload(&self, reply: Reply<&str>) {
        *self.upload_reply.lock().unwrap() = reply.map(str::to_string);
    }

    pub fn reply_flashcards(&self, reply: Reply<Vec<GeneratedFlashcard>>) {
        *self.flashcards_reply.lock().unwrap() = reply;
    }

    pub fn reply_quiz(&self, reply: Reply<GeneratedQuiz>) {
        *self.quiz_reply.lock().unwrap() = reply;
    }

    pub fn reply_notes(&self, reply: Reply<&str>) {
        *self.notes_reply.lock().unwrap() = reply.map(str::to_string);
    }

    pub fn reply_chat(&self, reply: Reply<&str>) {
        *self.chat_reply.lock().unwrap() = reply.map(str::to_string);
    }

    pub fn saved_notes(&self) -> Vec<SaveNoteRequest> {
        self.saved_notes.lock().unwrap().clone()
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    fn record(&self, operation: &'static str) {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
    }
}

#[async_trait]
impl LearningBackend for FakeBackend {
    async fn list_documents(&self) -> Result<Vec<SourceDocument>, LearningError> {
        self.record("list_documents");
        let scripted = self.list_script.lock().unwrap().pop_front();
        if let Some(ScriptedList { documents, gate }) = scripted {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            return Ok(documents);
        }
        if let Some(message) = self.list_failure.lock().unwrap().clone() {
            return Err(transport(message));
        }
        Ok(self.documents.lock().unwrap().clone())
    }

    async fn upload_document(&self, upload: &DocumentUpload) -> Result<String, LearningError> {
        self.record("upload_document");
        let id = self.upload_reply.lock().unwrap().clone().map_err(transport)?;
        self.documents
            .lock()
            .unwrap()
            .push(document(&id, &upload.file_name));
        Ok(id)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), LearningError> {
        self.record("delete_document");
        if let Some(message) = self.delete_failure.lock().unwrap().clone() {
            return Err(transport(message));
        }
        self.documents
            .lock()
            .unwrap()
            .retain(|doc| doc.id != document_id);
        Ok(())
    }

    async fn download_document(&self, document_id: &str) -> Result<Vec<u8>, LearningError> {
        self.record("download_document");
        Ok(format!("%PDF-{}", document_id).into_bytes())
    }

    async fn generate_flashcards(
        &self,
        _document_id: &str,
        _count: u32,
    ) -> Result<Vec<GeneratedFlashcard>, LearningError> {
        self.record("generate_flashcards");
        self.flashcards_reply.lock().unwrap().clone().map_err(transport)
    }

    async fn generate_quiz(
        &self,
        _document_id: &str,
        _count: u32,
        _options: &QuizOptions,
    ) -> Result<GeneratedQuiz, LearningError> {
        self.record("generate_quiz");
        self.quiz_reply.lock().unwrap().clone().map_err(transport)
    }

    async fn generate_notes(&self, _document_id: &str) -> Result<String, LearningError> {
        self.record("generate_notes");
        self.notes_reply.lock().unwrap().clone().map_err(transport)
    }

    async fn save_note(&self, request: &SaveNoteRequest) -> Result<Value, LearningError> {
        self.record("save_note");
        self.saved_notes.lock().unwrap().push(request.clone());
        Ok(json!({ "id": 1, "title": request.title }))
    }

    async fn send_chat_message(
        &self,
        _document_id: &str,
        _message: &str,
    ) -> Result<String, LearningError> {
        self.record("send_chat_message");
        self.chat_reply.lock().unwrap().clone().map_err(transport)
    }

    async fn recent(&self, _kind: RecentKind) -> Result<Vec<RecentItem>, LearningError> {
        self.record("recent");
        Ok(vec![RecentItem {
            id: "9".to_string(),
            title: Some("Cell biology quiz".to_string()),
            created_at: None,
        }])
    }
}

pub fn document(id: &str, title: &str) -> SourceDocument {
    SourceDocument {
        id: id.to_string(),
        title: title.to_string(),
        uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        kind: Default::default(),
    }
}

pub fn ids(documents: &[SourceDocument]) -> Vec<String> {
    documents.iter().map(|doc| doc.id.clone()).collect()
}

pub fn mc_question(id: &str, options: &[&str], answer: &str) -> QuizQuestion {
    QuizQuestion {
        id: id.to_string(),
        prompt: format!("Question {}", id),
        variant: QuestionVariant::MultipleChoice {
            options: options.iter().map(|o| o.to_string()).collect(),
        },
        correct_answer: answer.to_string(),
    }
}

/// Three multiple choice questions answered "A", "B", "C"
pub fn abc_quiz() -> GeneratedQuiz {
    GeneratedQuiz {
        quiz_type: QuizType::MultipleChoice,
        questions: vec![
            mc_question("q1", &["A", "B", "C", "X"], "A"),
            mc_question("q2", &["A", "B", "C", "X"], "B"),
            mc_question("q3", &["A", "B", "C", "X"], "C"),
        ],
    }
}

pub fn card(front: &str, back: &str) -> GeneratedFlashcard {
    GeneratedFlashcard {
        front: front.to_string(),
        back: back.to_string(),
    }
}

/// Store backed by an in-memory database with document "42" registered
pub async fn store_with(backend: Arc<FakeBackend>) -> ArtifactStore {
    let db = Database::new("sqlite::memory:").await.unwrap();
    store_on(backend, db).await
}

pub async fn store_on(backend: Arc<FakeBackend>, db: Database) -> ArtifactStore {
    let registry = DocumentRegistry::new(backend.clone());
    registry.refresh().await;
    ArtifactStore::open(backend, registry, db).await
}

pub fn biology_backend() -> Arc<FakeBackend> {
    FakeBackend::with_documents(vec![document("42", "Biology 101")])
}
