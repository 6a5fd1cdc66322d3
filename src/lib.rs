pub mod api;
pub mod artifact_store;
pub mod config;
pub mod database;
pub mod document_registry;
pub mod errors;
pub mod generation_gateway;
pub mod logging;
pub mod models;
pub mod quiz_session;

pub use artifact_store::{ArtifactStore, DEFAULT_GENERATION_COUNT};
pub use config::{Config, LoggingConfig};
pub use database::Database;
pub use document_registry::{DocumentRegistry, PollerHandle};
pub use errors::*;
pub use generation_gateway::{
    CredentialSource, HttpGateway, LearningBackend, SharedBackend, StaticCredentials,
    extract_error_message,
};
pub use models::*;
pub use quiz_session::{QuestionResult, QuizScore, QuizSession, SessionState};
