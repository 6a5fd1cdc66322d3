use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;
use uuid::Uuid;

use crate::{
    artifact_store::{ArtifactStore, DEFAULT_GENERATION_COUNT},
    document_registry::DocumentRegistry,
    errors::{ErrorContext, LearningError},
    models::*,
    quiz_session::{QuizScore, QuizSession, SessionState},
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success};

type ApiError = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub registry: DocumentRegistry,
    pub store: ArtifactStore,
    pub quiz_sessions: Arc<Mutex<HashMap<Uuid, QuizSession>>>,
}

impl AppState {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            registry: store.registry().clone(),
            store,
            quiz_sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, QuizSession>> {
        self.quiz_sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Deserialize)]
pub struct DocumentFilter {
    pub document_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UploadParams {
    pub file_name: String,
}

#[derive(Deserialize)]
pub struct CreateFlashcardRequest {
    pub document_id: String,
    pub front: String,
    pub back: String,
}

#[derive(Deserialize, Default)]
pub struct GenerateRequest {
    pub count: Option<u32>,
}

#[derive(Deserialize)]
pub struct GenerateQuizRequest {
    pub count: Option<u32>,
    #[serde(flatten)]
    pub options: QuizOptions,
}

#[derive(Deserialize)]
pub struct AskRequest {
    pub message: String,
}

#[derive(Deserialize)]
pub struct StartSessionRequest {
    pub quiz_id: Uuid,
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RegistryStatus {
    pub document_count: usize,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EngineStatus {
    pub documents: RegistryStatus,
    pub flashcards: usize,
    pub quizzes: usize,
    pub notes: usize,
    pub active_sessions: usize,
}

/// Question as shown to the learner; the answer key stays server-side
#[derive(Serialize, Deserialize, Debug)]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub kind: String,
    pub choices: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionView {
    pub session_id: Uuid,
    pub quiz_id: Uuid,
    pub quiz_title: String,
    pub state: SessionState,
    pub current_index: usize,
    pub total_questions: usize,
    pub answers: Vec<String>,
    pub can_advance: bool,
    pub question: QuestionView,
}

impl SessionView {
    fn new(session_id: Uuid, session: &QuizSession) -> Self {
        let question = session.current_question();
        Self {
            session_id,
            quiz_id: session.quiz().id,
            quiz_title: session.quiz().title.clone(),
            state: session.state(),
            current_index: session.current_index(),
            total_questions: session.len(),
            answers: session.answers().to_vec(),
            can_advance: session.can_advance(),
            question: QuestionView {
                id: question.id.clone(),
                prompt: question.prompt.clone(),
                kind: question.variant.name().to_string(),
                choices: question.answer_choices(),
            },
        }
    }
}

fn registry_status(registry: &DocumentRegistry) -> RegistryStatus {
    RegistryStatus {
        document_count: registry.documents().len(),
        loading: registry.is_loading(),
        error: registry.last_error(),
    }
}

// Document endpoints
pub async fn list_documents(State(state): State<AppState>) -> ApiResult<Vec<SourceDocument>> {
    let documents = state.registry.documents();
    log_api_success!("list_documents", count = documents.len(), "documents listed");
    Ok(Json(ApiResponse::success(documents)))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SourceDocument> {
    match state.registry.lookup(&id) {
        Some(document) => Ok(Json(ApiResponse::success(document))),
        None => {
            let context = ErrorContext::new("get_document", "document").with_id(&id);
            Err(LearningError::not_found("Document", &id).to_response_with_context(context))
        }
    }
}

pub async fn upload_document(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<SourceDocument> {
    log_api_start!("upload_document");
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let upload = DocumentUpload {
        file_name: params.file_name.clone(),
        content_type,
        bytes: body.to_vec(),
    };

    let id = state.registry.upload(&upload).await.map_err(|e| {
        let context = ErrorContext::new("upload_document", "document").with_id(&params.file_name);
        e.to_response_with_context(context)
    })?;

    // The upload refresh may have failed; fall back to a provisional entry
    let document = state.registry.lookup(&id).unwrap_or_else(|| SourceDocument {
        id: id.clone(),
        title: params.file_name.clone(),
        uploaded_at: chrono::Utc::now(),
        kind: DocumentKind::Pdf,
    });
    log_api_success!("upload_document", document_id = id, "document uploaded");
    Ok(Json(ApiResponse::success(document)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<bool> {
    log_api_start!("delete_document", document_id = id);
    state.registry.remove(&id).await.map_err(|e| {
        let context = ErrorContext::new("delete_document", "document").with_id(&id);
        e.to_response_with_context(context)
    })?;
    log_api_success!("delete_document", document_id = id, "document deleted");
    Ok(Json(ApiResponse::success(true)))
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.registry.download(&id).await.map_err(|e| {
        let context = ErrorContext::new("download_document", "document").with_id(&id);
        e.to_response_with_context(context)
    })?;
    Ok(([(header::CONTENT_TYPE, "application/pdf")], bytes))
}

pub async fn refresh_documents(State(state): State<AppState>) -> ApiResult<RegistryStatus> {
    state.registry.refresh().await;
    Ok(Json(ApiResponse::success(registry_status(&state.registry))))
}

pub async fn document_status(State(state): State<AppState>) -> ApiResult<RegistryStatus> {
    Ok(Json(ApiResponse::success(registry_status(&state.registry))))
}

// Flashcard endpoints
pub async fn list_flashcards(
    State(state): State<AppState>,
    Query(filter): Query<DocumentFilter>,
) -> ApiResult<Vec<Flashcard>> {
    let cards = match filter.document_id.as_deref() {
        Some(document_id) => state.store.flashcards_by_document(document_id),
        None => state.store.flashcards(),
    };
    log_api_success!("list_flashcards", count = cards.len(), "flashcards listed");
    Ok(Json(ApiResponse::success(cards)))
}

pub async fn create_flashcard(
    State(state): State<AppState>,
    Json(request): Json<CreateFlashcardRequest>,
) -> ApiResult<Flashcard> {
    log_api_start!("create_flashcard", document_id = request.document_id);
    match state
        .store
        .add_flashcard(&request.document_id, &request.front, &request.back)
        .await
    {
        Ok(card) => {
            log_api_success!("create_flashcard", document_id = request.document_id, "flashcard created");
            Ok(Json(ApiResponse::success(card)))
        }
        Err(e) => {
            let context =
                ErrorContext::new("create_flashcard", "flashcard").with_id(&request.document_id);
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn generate_flashcards(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    request: Option<Json<GenerateRequest>>,
) -> ApiResult<Vec<Flashcard>> {
    log_api_start!("generate_flashcards", document_id = document_id);
    let count = request
        .and_then(|Json(r)| r.count)
        .unwrap_or(DEFAULT_GENERATION_COUNT);

    match state.store.generate_flashcards(&document_id, count).await {
        Ok(cards) => {
            log_api_success!("generate_flashcards", document_id = document_id, "flashcards generated");
            Ok(Json(ApiResponse::success(cards)))
        }
        Err(e) => {
            let context =
                ErrorContext::new("generate_flashcards", "flashcard").with_id(&document_id);
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn delete_flashcard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<bool> {
    let removed = state.store.delete_flashcard(id).await.map_err(|e| {
        let context = ErrorContext::new("delete_flashcard", "flashcard").with_id(&id.to_string());
        e.to_response_with_context(context)
    })?;
    Ok(Json(ApiResponse::success(removed)))
}

pub async fn mark_flashcard_viewed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Flashcard> {
    let card = state.store.mark_flashcard_viewed(id).await.map_err(|e| {
        let context =
            ErrorContext::new("mark_flashcard_viewed", "flashcard").with_id(&id.to_string());
        e.to_response_with_context(context)
    })?;
    Ok(Json(ApiResponse::success(card)))
}

// Quiz endpoints
pub async fn list_quizzes(
    State(state): State<AppState>,
    Query(filter): Query<DocumentFilter>,
) -> ApiResult<Vec<Quiz>> {
    let quizzes = match filter.document_id.as_deref() {
        Some(document_id) => state.store.quizzes_by_document(document_id),
        None => state.store.quizzes(),
    };
    let quizzes: Vec<Quiz> = quizzes.iter().map(|quiz| Quiz::clone(quiz)).collect();
    Ok(Json(ApiResponse::success(quizzes)))
}

pub async fn get_quiz(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Quiz> {
    match state.store.get_quiz(id) {
        Some(quiz) => Ok(Json(ApiResponse::success(Quiz::clone(&quiz)))),
        None => {
            let context = ErrorContext::new("get_quiz", "quiz").with_id(&id.to_string());
            Err(LearningError::not_found("Quiz", id).to_response_with_context(context))
        }
    }
}

pub async fn generate_quiz(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Json(request): Json<GenerateQuizRequest>,
) -> ApiResult<Quiz> {
    log_api_start!("generate_quiz", document_id = document_id);
    let count = request.count.unwrap_or(DEFAULT_GENERATION_COUNT);

    match state
        .store
        .generate_quiz(&document_id, count, &request.options)
        .await
    {
        Ok(quiz) => {
            log_api_success!("generate_quiz", document_id = document_id, "quiz stored");
            Ok(Json(ApiResponse::success(Quiz::clone(&quiz))))
        }
        Err(e) => {
            let context = ErrorContext::new("generate_quiz", "quiz").with_id(&document_id);
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn delete_quiz(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<bool> {
    Ok(Json(ApiResponse::success(state.store.delete_quiz(id))))
}

// Note endpoints
pub async fn list_notes(
    State(state): State<AppState>,
    Query(filter): Query<DocumentFilter>,
) -> ApiResult<Vec<Note>> {
    let notes = match filter.document_id.as_deref() {
        Some(document_id) => state.store.notes_by_document(document_id),
        None => state.store.notes(),
    };
    Ok(Json(ApiResponse::success(notes)))
}

pub async fn generate_notes(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> ApiResult<Note> {
    log_api_start!("generate_notes", document_id = document_id);
    match state.store.generate_notes(&document_id).await {
        Ok(note) => {
            log_api_success!("generate_notes", document_id = document_id, "notes generated");
            Ok(Json(ApiResponse::success(note)))
        }
        Err(e) => {
            let context = ErrorContext::new("generate_notes", "note").with_id(&document_id);
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn delete_note(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<bool> {
    Ok(Json(ApiResponse::success(state.store.delete_note(id))))
}

pub async fn publish_note(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Value> {
    let record = state.store.publish_note(id).await.map_err(|e| {
        let context = ErrorContext::new("publish_note", "note").with_id(&id.to_string());
        e.to_response_with_context(context)
    })?;
    Ok(Json(ApiResponse::success(record)))
}

pub async fn recent_items(
    State(state): State<AppState>,
    Path(kind): Path<RecentKind>,
) -> ApiResult<Vec<RecentItem>> {
    let items = state.store.recent(kind).await.map_err(|e| {
        let context = ErrorContext::new("recent_items", kind.endpoint());
        e.to_response_with_context(context)
    })?;
    Ok(Json(ApiResponse::success(items)))
}

// Chat endpoints
pub async fn chat_history(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> ApiResult<Vec<ChatMessage>> {
    Ok(Json(ApiResponse::success(
        state.store.chat_history(Some(&document_id)),
    )))
}

pub async fn ask_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Json(request): Json<AskRequest>,
) -> ApiResult<ChatMessage> {
    log_api_start!("ask_document", document_id = document_id);
    match state.store.ask(&document_id, &request.message).await {
        Ok(reply) => Ok(Json(ApiResponse::success(reply))),
        Err(e) => {
            let context = ErrorContext::new("ask_document", "chat").with_id(&document_id);
            Err(e.to_response_with_context(context))
        }
    }
}

// Quiz session endpoints
fn session_not_found(operation: &str, session_id: Uuid) -> ApiError {
    log_api_error!(operation, session_id = session_id, "session not found");
    let context = ErrorContext::new(operation, "quiz_session").with_id(&session_id.to_string());
    LearningError::not_found("Quiz session", session_id).to_response_with_context(context)
}

/// Apply `action` to a live session and return its updated view
fn with_session(
    state: &AppState,
    operation: &str,
    session_id: Uuid,
    action: impl FnOnce(&mut QuizSession),
) -> ApiResult<SessionView> {
    let mut sessions = state.sessions();
    match sessions.get_mut(&session_id) {
        Some(session) => {
            action(session);
            Ok(Json(ApiResponse::success(SessionView::new(session_id, session))))
        }
        None => Err(session_not_found(operation, session_id)),
    }
}

pub async fn start_quiz_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> ApiResult<SessionView> {
    log_api_start!("start_quiz_session");
    let context = ErrorContext::new("start_quiz_session", "quiz").with_id(&request.quiz_id.to_string());

    let quiz = match state.store.get_quiz(request.quiz_id) {
        Some(quiz) => quiz,
        None => {
            return Err(LearningError::not_found("Quiz", request.quiz_id)
                .to_response_with_context(context));
        }
    };
    let session = QuizSession::new(quiz).map_err(|e| e.to_response_with_context(context))?;

    let session_id = Uuid::new_v4();
    let view = SessionView::new(session_id, &session);
    state.sessions().insert(session_id, session);

    info!(
        session_id = %session_id,
        quiz_id = %request.quiz_id,
        question_count = view.total_questions,
        "Quiz session started"
    );
    Ok(Json(ApiResponse::success(view)))
}

pub async fn get_quiz_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<SessionView> {
    with_session(&state, "get_quiz_session", session_id, |_| {})
}

pub async fn answer_question(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<SessionView> {
    with_session(&state, "answer_question", session_id, |session| {
        session.answer(request.answer);
    })
}

pub async fn next_question(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<SessionView> {
    with_session(&state, "next_question", session_id, |session| {
        if session.next() == SessionState::Completed {
            log_api_success!("next_question", session_id = session_id, "session completed");
        }
    })
}

pub async fn previous_question(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<SessionView> {
    with_session(&state, "previous_question", session_id, |session| {
        session.previous();
    })
}

pub async fn reset_quiz_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<SessionView> {
    with_session(&state, "reset_quiz_session", session_id, QuizSession::reset)
}

/// Score a completed session; the session is discarded once scored
pub async fn score_quiz_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<QuizScore> {
    let mut sessions = state.sessions();
    let session = match sessions.get(&session_id) {
        Some(session) => session,
        None => return Err(session_not_found("score_quiz_session", session_id)),
    };

    match session.score() {
        Ok(score) => {
            sessions.remove(&session_id);
            log_api_success!("score_quiz_session", session_id = session_id, format!("{}/{} correct", score.correct, score.total));
            Ok(Json(ApiResponse::success(score)))
        }
        Err(e) => {
            let context =
                ErrorContext::new("score_quiz_session", "quiz_session").with_id(&session_id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn abandon_quiz_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<bool> {
    Ok(Json(ApiResponse::success(
        state.sessions().remove(&session_id).is_some(),
    )))
}

pub async fn engine_status(State(state): State<AppState>) -> ApiResult<EngineStatus> {
    Ok(Json(ApiResponse::success(EngineStatus {
        documents: registry_status(&state.registry),
        flashcards: state.store.flashcards().len(),
        quizzes: state.store.quizzes().len(),
        notes: state.store.notes().len(),
        active_sessions: state.sessions().len(),
    })))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Document routes
        .route("/api/documents", get(list_documents).post(upload_document))
        .route("/api/documents/refresh", post(refresh_documents))
        .route("/api/documents/status", get(document_status))
        .route("/api/documents/:id", get(get_document).delete(delete_document))
        .route("/api/documents/:id/download", get(download_document))
        .route("/api/documents/:id/flashcards/generate", post(generate_flashcards))
        .route("/api/documents/:id/quizzes/generate", post(generate_quiz))
        .route("/api/documents/:id/notes/generate", post(generate_notes))
        .route("/api/documents/:id/chat", get(chat_history).post(ask_document))

        // Artifact routes
        .route("/api/flashcards", get(list_flashcards).post(create_flashcard))
        .route("/api/flashcards/:id", delete(delete_flashcard))
        .route("/api/flashcards/:id/viewed", post(mark_flashcard_viewed))
        .route("/api/quizzes", get(list_quizzes))
        .route("/api/quizzes/:id", get(get_quiz).delete(delete_quiz))
        .route("/api/notes", get(list_notes))
        .route("/api/notes/:id", delete(delete_note))
        .route("/api/notes/:id/publish", post(publish_note))
        .route("/api/recent/:kind", get(recent_items))

        // Quiz session routes
        .route("/api/sessions", post(start_quiz_session))
        .route("/api/sessions/:id", get(get_quiz_session).delete(abandon_quiz_session))
        .route("/api/sessions/:id/answer", post(answer_question))
        .route("/api/sessions/:id/next", post(next_question))
        .route("/api/sessions/:id/previous", post(previous_question))
        .route("/api/sessions/:id/reset", post(reset_quiz_session))
        .route("/api/sessions/:id/score", post(score_quiz_session))

        .route("/api/status", get(engine_status))
        .with_state(state)
}
