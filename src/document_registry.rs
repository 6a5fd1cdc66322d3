use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::errors::LearningError;
use crate::generation_gateway::SharedBackend;
use crate::models::{DocumentKind, DocumentUpload, RegistryEvent, SourceDocument};
use crate::{log_store_operation, log_system_event};

const COMPONENT: &str = "document_registry";
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct RegistryState {
    documents: Vec<SourceDocument>,
    virtual_documents: Vec<SourceDocument>,
    in_flight: usize,
    error: Option<String>,
    /// Last ticket handed to a refresh
    issued: u64,
    /// Ticket of the response currently reflected in `documents`
    applied: u64,
}

/// Single source of truth for which documents exist.
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Clone)]
pub struct DocumentRegistry {
    backend: SharedBackend,
    state: Arc<RwLock<RegistryState>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl DocumentRegistry {
    pub fn new(backend: SharedBackend) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            state: Arc::new(RwLock::new(RegistryState::default())),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: RegistryEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Fetch the document list and apply it. Failures are recorded in
    /// `last_error()` and never returned.
    pub async fn refresh(&self) {
        let _ = self.try_refresh().await;
    }

    async fn try_refresh(&self) -> Result<(), LearningError> {
        let ticket = {
            let mut state = self.write();
            state.issued += 1;
            state.in_flight += 1;
            state.error = None;
            state.issued
        };
        log_store_operation!(start, COMPONENT, "refresh");

        let result = self.backend.list_documents().await;

        let event = {
            let mut state = self.write();
            state.in_flight -= 1;

            if ticket < state.applied {
                debug!(
                    component = COMPONENT,
                    ticket,
                    applied = state.applied,
                    "Discarding response from an older refresh"
                );
                None
            } else {
                match &result {
                    Ok(documents) => {
                        // The slot always describes the list currently shown
                        state.applied = ticket;
                        state.error = None;
                        if state.documents == *documents {
                            None
                        } else {
                            state.documents = documents.clone();
                            Some(RegistryEvent::DocumentsChanged {
                                count: state.documents.len() + state.virtual_documents.len(),
                            })
                        }
                    }
                    Err(e) => {
                        let message = e.user_message();
                        state.error = Some(message.clone());
                        Some(RegistryEvent::RefreshFailed { message })
                    }
                }
            }
        };

        match &result {
            Ok(documents) => {
                log_store_operation!(success, COMPONENT, "refresh", count = documents.len());
            }
            Err(e) => {
                log_store_operation!(error, COMPONENT, "refresh", error = e);
            }
        }

        if let Some(event) = event {
            self.notify(event);
        }
        result.map(|_| ())
    }

    /// Upload a PDF and return its backend id. The registry is refreshed
    /// before returning so the new document is immediately visible.
    pub async fn upload(&self, upload: &DocumentUpload) -> Result<String, LearningError> {
        log_store_operation!(start, COMPONENT, "upload");
        validate_upload(upload).map_err(LearningError::upload)?;

        let id = self
            .backend
            .upload_document(upload)
            .await
            .map_err(LearningError::upload)?;

        if let Err(e) = self.try_refresh().await {
            log_store_operation!(
                warn,
                COMPONENT,
                "upload",
                format!("document '{}' uploaded but the list could not be refreshed: {}", id, e)
            );
        }

        log_store_operation!(success, COMPONENT, "upload", document_id = id, count = 1);
        Ok(id)
    }

    /// Delete a document. An error means the caller must verify state:
    /// `StaleAfterDelete` reports that the backend deleted it but the local
    /// set could not be refreshed.
    pub async fn remove(&self, document_id: &str) -> Result<(), LearningError> {
        log_store_operation!(start, COMPONENT, "remove", document_id = document_id);

        if self.forget_virtual(document_id) {
            return Ok(());
        }

        self.backend
            .delete_document(document_id)
            .await
            .map_err(LearningError::delete)?;

        self.try_refresh()
            .await
            .map_err(|e| LearningError::StaleAfterDelete(Box::new(e)))?;

        log_store_operation!(success, COMPONENT, "remove", document_id = document_id, count = 1);
        Ok(())
    }

    pub fn lookup(&self, document_id: &str) -> Option<SourceDocument> {
        let state = self.read();
        state
            .documents
            .iter()
            .chain(state.virtual_documents.iter())
            .find(|doc| doc.id == document_id)
            .cloned()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.lookup(document_id).is_some()
    }

    /// Raw file bytes of a known PDF
    pub async fn download(&self, document_id: &str) -> Result<Vec<u8>, LearningError> {
        let document = self
            .lookup(document_id)
            .ok_or_else(|| LearningError::not_found("Document", document_id))?;
        if document.kind != DocumentKind::Pdf {
            return Err(LearningError::InvalidInput(format!(
                "document '{}' is not a PDF and has no file to download",
                document_id
            )));
        }
        self.backend.download_document(document_id).await
    }

    /// Backend documents followed by local virtual ones
    pub fn documents(&self) -> Vec<SourceDocument> {
        let state = self.read();
        state
            .documents
            .iter()
            .chain(state.virtual_documents.iter())
            .cloned()
            .collect()
    }

    pub fn is_loading(&self) -> bool {
        self.read().in_flight > 0
    }

    pub fn last_error(&self) -> Option<String> {
        self.read().error.clone()
    }

    /// Register a local pseudo-document (e.g. a video). It is never sent to
    /// the backend and survives refreshes.
    pub fn register_virtual(&self, document: SourceDocument) {
        let count = {
            let mut state = self.write();
            state.virtual_documents.retain(|doc| doc.id != document.id);
            state.virtual_documents.push(document);
            state.documents.len() + state.virtual_documents.len()
        };
        self.notify(RegistryEvent::DocumentsChanged { count });
    }

    pub fn forget_virtual(&self, document_id: &str) -> bool {
        let removed = {
            let mut state = self.write();
            let before = state.virtual_documents.len();
            state.virtual_documents.retain(|doc| doc.id != document_id);
            (before != state.virtual_documents.len())
                .then(|| state.documents.len() + state.virtual_documents.len())
        };
        match removed {
            Some(count) => {
                self.notify(RegistryEvent::DocumentsChanged { count });
                true
            }
            None => false,
        }
    }

    /// Refresh on a fixed interval until the returned handle is stopped or dropped.
    /// The first refresh happens immediately.
    pub fn start_polling(&self, period: Duration) -> PollerHandle {
        let registry = self.clone();
        log_system_event!(startup, component = COMPONENT, format!("polling every {:?}", period));
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                registry.refresh().await;
            }
        });
        PollerHandle { task }
    }
}

/// Owns the background poll task
pub struct PollerHandle {
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        log_system_event!(shutdown, component = COMPONENT, "polling stopped");
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn validate_upload(upload: &DocumentUpload) -> Result<(), LearningError> {
    if upload.bytes.is_empty() {
        return Err(LearningError::Validation(format!(
            "'{}' is empty",
            upload.file_name
        )));
    }
    let mime = upload
        .content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    if !mime.eq_ignore_ascii_case("application/pdf") {
        return Err(LearningError::Validation(format!(
            "'{}' is not a PDF (got '{}')",
            upload.file_name, upload.content_type
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload(&DocumentUpload::pdf("notes.pdf", b"%PDF-1.7".to_vec())).is_ok());

        let empty = DocumentUpload::pdf("empty.pdf", Vec::new());
        assert!(validate_upload(&empty).is_err());

        let mut image = DocumentUpload::pdf("scan.png", vec![1, 2, 3]);
        image.content_type = "image/png".to_string();
        assert!(validate_upload(&image).is_err());

        let mut with_params = DocumentUpload::pdf("notes.pdf", vec![1]);
        with_params.content_type = "Application/PDF; charset=binary".to_string();
        assert!(validate_upload(&with_params).is_ok());
    }
}
