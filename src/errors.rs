use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Failure taxonomy shared by the gateway, the registry, the store and quiz sessions
#[derive(Debug, thiserror::Error)]
pub enum LearningError {
    #[error("{message}")]
    Transport { status: Option<u16>, message: String },

    #[error("Invalid response: {0}")]
    Validation(String),

    /// The caller's own request was rejected before reaching the backend
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("{resource_type} with id '{id}' not found")]
    NotFound { resource_type: String, id: String },

    #[error("Upload failed: {0}")]
    Upload(#[source] Box<LearningError>),

    #[error("Delete failed: {0}")]
    Delete(#[source] Box<LearningError>),

    #[error("Document deleted but the list could not be refreshed: {0}")]
    StaleAfterDelete(#[source] Box<LearningError>),

    #[error("Generation failed: {0}")]
    Generation(#[source] Box<LearningError>),

    #[error("Quiz session is not completed")]
    SessionNotCompleted,

    #[error("Local storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl LearningError {
    pub fn not_found(resource_type: &str, id: impl ToString) -> Self {
        LearningError::NotFound {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }
    }

    pub fn upload(inner: LearningError) -> Self {
        LearningError::Upload(Box::new(inner))
    }

    pub fn delete(inner: LearningError) -> Self {
        LearningError::Delete(Box::new(inner))
    }

    pub fn generation(inner: LearningError) -> Self {
        LearningError::Generation(Box::new(inner))
    }

    /// The innermost error once operation wrappers are peeled off
    pub fn root(&self) -> &LearningError {
        match self {
            LearningError::Upload(inner)
            | LearningError::Delete(inner)
            | LearningError::StaleAfterDelete(inner)
            | LearningError::Generation(inner) => inner.root(),
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), LearningError::Validation(_))
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self.root(), LearningError::InvalidInput(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), LearningError::NotFound { .. })
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self.root(), LearningError::AuthRequired)
    }

    /// Short message suitable for showing to the learner
    pub fn user_message(&self) -> String {
        match self {
            LearningError::Transport { message, .. } => message.clone(),
            LearningError::Validation(_) => {
                "The service returned an unexpected result. Please try again.".to_string()
            }
            LearningError::InvalidInput(reason) => reason.clone(),
            LearningError::AuthRequired => "Please sign in to continue.".to_string(),
            LearningError::NotFound { resource_type, .. } => {
                format!("{} not found", resource_type)
            }
            LearningError::Upload(inner) => match inner.root() {
                LearningError::Validation(reason) => format!("Upload failed: {}", reason),
                other => format!("Upload failed: {}", other.user_message()),
            },
            LearningError::Delete(inner) => format!("Delete failed: {}", inner.user_message()),
            LearningError::StaleAfterDelete(_) => {
                "The document was deleted, but the list may be out of date.".to_string()
            }
            LearningError::Generation(inner) => {
                format!("Generation failed: {}", inner.user_message())
            }
            LearningError::SessionNotCompleted => {
                "Finish the quiz before viewing the score.".to_string()
            }
            LearningError::Storage(_) => {
                "Could not save your flashcards. Please try again.".to_string()
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.root() {
            LearningError::NotFound { .. } => StatusCode::NOT_FOUND,
            LearningError::AuthRequired => StatusCode::UNAUTHORIZED,
            LearningError::SessionNotCompleted => StatusCode::CONFLICT,
            LearningError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            LearningError::Validation(_) => match self {
                LearningError::Upload(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            },
            LearningError::Transport { .. } => StatusCode::BAD_GATEWAY,
            LearningError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

impl LearningError {
    /// Log at a level matching the failure and return the message to present
    pub fn log_with_context(&self, context: &ErrorContext) -> String {
        match self.root() {
            LearningError::NotFound { .. } | LearningError::SessionNotCompleted => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Request could not be satisfied"
                );
            }
            LearningError::Validation(_)
            | LearningError::InvalidInput(_)
            | LearningError::AuthRequired => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Rejected operation"
                );
            }
            _ => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Operation failed"
                );
            }
        }

        context
            .user_friendly_message
            .clone()
            .unwrap_or_else(|| self.user_message())
    }

    /// Convert to the local API's error envelope
    pub fn to_response_with_context(
        self,
        context: ErrorContext,
    ) -> (StatusCode, Json<ApiResponse<()>>) {
        let message = self.log_with_context(&context);
        (self.status_code(), Json(ApiResponse::error(message)))
    }
}
