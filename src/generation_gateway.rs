use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, multipart};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::errors::LearningError;
use crate::log_gateway_call;
use crate::models::{
    DocumentKind, DocumentUpload, GeneratedFlashcard, GeneratedQuiz, QuestionVariant, QuizOptions,
    QuizQuestion, QuizType, RecentItem, RecentKind, SaveNoteRequest, SourceDocument,
    TRUE_FALSE_OPTIONS,
};

/// Supplies the bearer credential for backend calls. Token storage lives outside this crate.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed credential, typically read from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl CredentialSource for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone().filter(|t| !t.is_empty())
    }
}

/// Adapter boundary between the stores and the learning backend.
///
/// Implementations only translate requests and normalize results; business
/// rules such as answer-key validation stay in the stores.
#[async_trait]
pub trait LearningBackend: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<SourceDocument>, LearningError>;

    async fn upload_document(&self, upload: &DocumentUpload) -> Result<String, LearningError>;

    async fn delete_document(&self, document_id: &str) -> Result<(), LearningError>;

    async fn download_document(&self, document_id: &str) -> Result<Vec<u8>, LearningError>;

    async fn generate_flashcards(
        &self,
        document_id: &str,
        count: u32,
    ) -> Result<Vec<GeneratedFlashcard>, LearningError>;

    async fn generate_quiz(
        &self,
        document_id: &str,
        count: u32,
        options: &QuizOptions,
    ) -> Result<GeneratedQuiz, LearningError>;

    async fn generate_notes(&self, document_id: &str) -> Result<String, LearningError>;

    async fn save_note(&self, request: &SaveNoteRequest) -> Result<Value, LearningError>;

    async fn send_chat_message(
        &self,
        document_id: &str,
        message: &str,
    ) -> Result<String, LearningError>;

    async fn recent(&self, kind: RecentKind) -> Result<Vec<RecentItem>, LearningError>;
}

pub type SharedBackend = Arc<dyn LearningBackend>;

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireDocument {
    id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uploaded_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireDocumentList {
    Bare(Vec<WireDocument>),
    Wrapped { pdfs: Vec<WireDocument> },
}

#[derive(Debug, Deserialize)]
struct WireUploadResponse {
    #[serde(default)]
    pdf_id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct LearningRequest<'a> {
    pdf_id: &'a str,
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_items: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    difficulty: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quiz_type: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct WireFlashcard {
    #[serde(default)]
    question: String,
    #[serde(default)]
    answer: String,
}

#[derive(Debug, Deserialize)]
struct WireFlashcards {
    flashcards: Vec<WireFlashcard>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireQuestion {
    #[serde(default)]
    question: String,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    correct_answer: Option<String>,
    #[serde(default)]
    statement: Option<String>,
    #[serde(default, alias = "type")]
    question_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireQuiz {
    questions: Vec<WireQuestion>,
    #[serde(default)]
    quiz_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireNotes {
    notes: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    pdf_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRecentItem {
    id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

// ============================================================================
// Normalization
// ============================================================================

/// Ids arrive as UUID strings or integers depending on the endpoint
fn opaque_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn normalize_document(wire: WireDocument) -> Result<SourceDocument, LearningError> {
    let id = opaque_id(&wire.id)
        .ok_or_else(|| LearningError::Validation("document without an id".to_string()))?;
    let uploaded_at = match wire.uploaded_at.as_deref() {
        Some(raw) => parse_timestamp(raw).ok_or_else(|| {
            LearningError::Validation(format!("document '{}' has an unreadable upload time", id))
        })?,
        None => DateTime::<Utc>::default(),
    };
    Ok(SourceDocument {
        title: wire.title.unwrap_or_else(|| format!("Document {}", id)),
        id,
        uploaded_at,
        kind: DocumentKind::Pdf,
    })
}

fn is_true_false_pair(options: &[String]) -> bool {
    options.len() == 2
        && TRUE_FALSE_OPTIONS
            .iter()
            .all(|literal| options.iter().any(|o| o.trim().eq_ignore_ascii_case(literal)))
}

fn variant_from_tag(tag: &str, options: Vec<String>) -> Option<QuestionVariant> {
    match tag.trim().to_lowercase().as_str() {
        "multiple_choice" | "mcq" => Some(QuestionVariant::MultipleChoice { options }),
        "true_false" | "boolean" => Some(QuestionVariant::TrueFalse),
        "fill_in_blank" | "fill_in_the_blank" => Some(QuestionVariant::FillInBlank),
        _ => None,
    }
}

fn infer_variant(options: Vec<String>) -> QuestionVariant {
    if options.is_empty() {
        QuestionVariant::FillInBlank
    } else if is_true_false_pair(&options) {
        QuestionVariant::TrueFalse
    } else {
        QuestionVariant::MultipleChoice { options }
    }
}

/// Turn a backend question into the tagged form the session engine consumes
pub(crate) fn normalize_question(requested: QuizType, wire: WireQuestion) -> QuizQuestion {
    let options = wire.options.unwrap_or_default();
    let variant = match requested {
        QuizType::MultipleChoice => QuestionVariant::MultipleChoice { options },
        QuizType::TrueFalse => QuestionVariant::TrueFalse,
        QuizType::FillInBlank => QuestionVariant::FillInBlank,
        QuizType::Mixed => match wire.question_type.as_deref() {
            Some(tag) => {
                variant_from_tag(tag, options.clone()).unwrap_or_else(|| infer_variant(options))
            }
            None => infer_variant(options),
        },
    };

    let mut correct_answer = wire.correct_answer.unwrap_or_default();
    let mut prompt = wire.question;
    if variant == QuestionVariant::TrueFalse {
        correct_answer = correct_answer.trim().to_lowercase();
        if let Some(statement) = wire.statement.filter(|s| !s.trim().is_empty()) {
            prompt = statement;
        }
    }

    QuizQuestion {
        id: format!("q-{}", Uuid::new_v4()),
        prompt,
        variant,
        correct_answer,
    }
}

/// Pull a human-readable message out of whatever error body the backend sent
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    for key in ["error", "detail", "message"] {
        if let Some(message) = value.get(key).and_then(Value::as_str) {
            if !message.trim().is_empty() {
                return Some(message.to_string());
            }
        }
    }
    first_string(&value)
}

fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_string),
        Value::Object(map) => map.values().find_map(first_string),
        _ => None,
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// `LearningBackend` over the REST API
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialSource>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn CredentialSource>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticated request builder; fails before any network I/O without a credential
    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, LearningError> {
        let token = self
            .credentials
            .bearer_token()
            .ok_or(LearningError::AuthRequired)?;
        Ok(self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token))
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, LearningError> {
        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            log_gateway_call!(error, path, status = None::<u16>, error = e);
            LearningError::Transport {
                status: None,
                message: "Could not reach the learning service".to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body).unwrap_or_else(|| {
                format!(
                    "Request failed: {}",
                    status.canonical_reason().unwrap_or("unexpected status")
                )
            });
            log_gateway_call!(error, path, status = Some(status.as_u16()), error = message);
            return Err(LearningError::Transport {
                status: Some(status.as_u16()),
                message,
            });
        }

        log_gateway_call!(
            success,
            path,
            status = status.as_u16(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, LearningError> {
        let response = self.send(path, request).await?;
        let body = response.text().await.map_err(|e| LearningError::Transport {
            status: None,
            message: format!("Response body could not be read: {}", e),
        })?;
        serde_json::from_str::<T>(&body).map_err(|e| {
            LearningError::Validation(format!("unexpected response from {}: {}", path, e))
        })
    }

    async fn learning<T: DeserializeOwned>(
        &self,
        body: &LearningRequest<'_>,
    ) -> Result<T, LearningError> {
        const PATH: &str = "/api/learning/";
        log_gateway_call!(start, PATH, method = "POST");
        let request = self.request(Method::POST, PATH)?.json(body);
        self.send_json(PATH, request).await
    }
}

#[async_trait]
impl LearningBackend for HttpGateway {
    async fn list_documents(&self) -> Result<Vec<SourceDocument>, LearningError> {
        const PATH: &str = "/api/pdfs/";
        log_gateway_call!(start, PATH, method = "GET");
        let request = self.request(Method::GET, PATH)?;
        let list: WireDocumentList = self.send_json(PATH, request).await?;
        let wire = match list {
            WireDocumentList::Bare(docs) => docs,
            WireDocumentList::Wrapped { pdfs } => pdfs,
        };
        wire.into_iter().map(normalize_document).collect()
    }

    async fn upload_document(&self, upload: &DocumentUpload) -> Result<String, LearningError> {
        const PATH: &str = "/api/pdfs/upload/";
        log_gateway_call!(start, PATH, method = "POST");
        let part = multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)
            .map_err(|_| {
                LearningError::Validation(format!("invalid content type '{}'", upload.content_type))
            })?;
        let form = multipart::Form::new().part("file", part);
        let request = self.request(Method::POST, PATH)?.multipart(form);
        let response: WireUploadResponse = self.send_json(PATH, request).await?;
        response
            .pdf_id
            .as_ref()
            .and_then(opaque_id)
            .ok_or_else(|| LearningError::Validation("upload response has no pdf_id".to_string()))
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), LearningError> {
        let path = format!("/api/pdfs/{}/delete/", document_id);
        log_gateway_call!(start, path, method = "DELETE");
        let request = self.request(Method::DELETE, &path)?;
        self.send(&path, request).await?;
        Ok(())
    }

    async fn download_document(&self, document_id: &str) -> Result<Vec<u8>, LearningError> {
        let path = format!("/api/pdfs/{}/download/", document_id);
        log_gateway_call!(start, path, method = "GET");
        let request = self.request(Method::GET, &path)?;
        let response = self.send(&path, request).await?;
        let bytes = response.bytes().await.map_err(|e| LearningError::Transport {
            status: None,
            message: format!("Download interrupted: {}", e),
        })?;
        Ok(bytes.to_vec())
    }

    async fn generate_flashcards(
        &self,
        document_id: &str,
        count: u32,
    ) -> Result<Vec<GeneratedFlashcard>, LearningError> {
        let response: WireFlashcards = self
            .learning(&LearningRequest {
                pdf_id: document_id,
                mode: "generate-flashcards",
                num_items: Some(count),
                difficulty: None,
                language: None,
                quiz_type: None,
            })
            .await?;
        Ok(response
            .flashcards
            .into_iter()
            .map(|card| GeneratedFlashcard {
                front: card.question,
                back: card.answer,
            })
            .collect())
    }

    async fn generate_quiz(
        &self,
        document_id: &str,
        count: u32,
        options: &QuizOptions,
    ) -> Result<GeneratedQuiz, LearningError> {
        let response: WireQuiz = self
            .learning(&LearningRequest {
                pdf_id: document_id,
                mode: "generate-quiz",
                num_items: Some(count),
                difficulty: Some(options.difficulty.as_str()),
                language: Some(&options.language),
                quiz_type: Some(options.quiz_type.as_str()),
            })
            .await?;
        let quiz_type = response
            .quiz_type
            .as_deref()
            .and_then(QuizType::parse)
            .unwrap_or(options.quiz_type);
        Ok(GeneratedQuiz {
            quiz_type,
            questions: response
                .questions
                .into_iter()
                .map(|q| normalize_question(quiz_type, q))
                .collect(),
        })
    }

    async fn generate_notes(&self, document_id: &str) -> Result<String, LearningError> {
        let response: WireNotes = self
            .learning(&LearningRequest {
                pdf_id: document_id,
                mode: "generate-notes",
                num_items: None,
                difficulty: None,
                language: None,
                quiz_type: None,
            })
            .await?;
        Ok(response.notes)
    }

    async fn save_note(&self, request: &SaveNoteRequest) -> Result<Value, LearningError> {
        const PATH: &str = "/api/notes/";
        log_gateway_call!(start, PATH, method = "POST");
        let builder = self.request(Method::POST, PATH)?.json(request);
        self.send_json(PATH, builder).await
    }

    async fn send_chat_message(
        &self,
        document_id: &str,
        message: &str,
    ) -> Result<String, LearningError> {
        const PATH: &str = "/api/chat/";
        log_gateway_call!(start, PATH, method = "POST");
        let request = self.request(Method::POST, PATH)?.json(&ChatRequest {
            message,
            pdf_id: document_id,
        });
        let response: ChatResponse = self.send_json(PATH, request).await?;
        response
            .response
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| LearningError::Validation("chat response is empty".to_string()))
    }

    async fn recent(&self, kind: RecentKind) -> Result<Vec<RecentItem>, LearningError> {
        let path = format!("/api/learning/{}/", kind.endpoint());
        log_gateway_call!(start, path, method = "GET");
        let request = self.request(Method::GET, &path)?;
        let items: Vec<WireRecentItem> = self.send_json(&path, request).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| {
                Some(RecentItem {
                    id: opaque_id(&item.id)?,
                    title: item.title,
                    created_at: item.created_at,
                })
            })
            .collect())
    }
}
