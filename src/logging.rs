// Macros file - tracing macros are referenced by full path inside each macro

/// Standardized logging macros so the registry, the store, the gateway and
/// the local API all emit the same field names.

// ============================================================================
// Local API Logging Macros
// ============================================================================

/// Log the start of a local API operation
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, document_id = $document_id:expr) => {
        tracing::debug!(
            operation = $operation,
            document_id = %$document_id,
            "API operation started"
        );
    };
    ($operation:expr, session_id = $session_id:expr) => {
        tracing::debug!(
            operation = $operation,
            session_id = %$session_id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(operation = $operation, "API operation started");
    };
}

/// Log successful completion of a local API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, document_id = $document_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            document_id = %$document_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, session_id = $session_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            session_id = %$session_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(operation = $operation, "API operation completed: {}", $msg);
    };
}

/// Log local API failures that are not already reported through `ErrorContext`
#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, session_id = $session_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            session_id = %$session_id,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(operation = $operation, "API operation failed: {}", $msg);
    };
}

// ============================================================================
// Store Logging Macros
// ============================================================================

/// Log registry and artifact store operations
#[macro_export]
macro_rules! log_store_operation {
    (start, $component:expr, $operation:expr, document_id = $document_id:expr) => {
        tracing::debug!(
            component = $component,
            operation = $operation,
            document_id = %$document_id,
            "Store operation started"
        );
    };
    (start, $component:expr, $operation:expr) => {
        tracing::debug!(
            component = $component,
            operation = $operation,
            "Store operation started"
        );
    };
    (success, $component:expr, $operation:expr, count = $count:expr) => {
        tracing::info!(
            component = $component,
            operation = $operation,
            count = $count,
            "Store operation completed"
        );
    };
    (success, $component:expr, $operation:expr, document_id = $document_id:expr, count = $count:expr) => {
        tracing::info!(
            component = $component,
            operation = $operation,
            document_id = %$document_id,
            count = $count,
            "Store operation completed"
        );
    };
    (warn, $component:expr, $operation:expr, $msg:expr) => {
        tracing::warn!(
            component = $component,
            operation = $operation,
            "Store warning: {}", $msg
        );
    };
    (error, $component:expr, $operation:expr, error = $error:expr) => {
        tracing::error!(
            component = $component,
            operation = $operation,
            error = %$error,
            "Store operation failed"
        );
    };
}

// ============================================================================
// Gateway Logging Macros
// ============================================================================

/// Log backend calls made by the generation gateway
#[macro_export]
macro_rules! log_gateway_call {
    (start, $endpoint:expr, method = $method:expr) => {
        tracing::debug!(
            component = "generation_gateway",
            endpoint = %$endpoint,
            method = $method,
            "Backend call started"
        );
    };
    (success, $endpoint:expr, status = $status:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "generation_gateway",
            endpoint = %$endpoint,
            status = $status,
            duration_ms = $duration,
            "Backend call completed"
        );
    };
    (error, $endpoint:expr, status = $status:expr, error = $error:expr) => {
        tracing::warn!(
            component = "generation_gateway",
            endpoint = %$endpoint,
            status = ?$status,
            error = %$error,
            "Backend call failed"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    #[test]
    fn test_logging_macros_compile() {
        let session_id = Uuid::new_v4();
        let error = crate::errors::LearningError::AuthRequired;

        log_api_start!("list_documents");
        log_api_start!("generate_quiz", document_id = "42");
        log_api_start!("answer", session_id = session_id);

        log_api_success!("generate_quiz", document_id = "42", "quiz stored");
        log_api_success!("answer", session_id = session_id, "answer recorded");
        log_api_success!("list_flashcards", count = 3, "flashcards listed");
        log_api_success!("refresh", "documents refreshed");

        log_api_error!("score", session_id = session_id, "session still in progress");
        log_api_error!("start_session", "quiz not found");

        log_store_operation!(start, "artifact_store", "generate_notes", document_id = "42");
        log_store_operation!(start, "document_registry", "refresh");
        log_store_operation!(success, "document_registry", "refresh", count = 2);
        log_store_operation!(success, "artifact_store", "generate_flashcards", document_id = "42", count = 5);
        log_store_operation!(warn, "artifact_store", "generate_flashcards", "blank card skipped");
        log_store_operation!(error, "artifact_store", "persist_flashcards", error = error);

        log_gateway_call!(start, "/api/pdfs/", method = "GET");
        log_gateway_call!(success, "/api/pdfs/", status = 200u16, duration_ms = 12u64);
        log_gateway_call!(error, "/api/pdfs/", status = Some(500u16), error = error);

        log_system_event!(startup, component = "server", "server starting");
        log_system_event!(shutdown, component = "poller", "poller stopped");
        log_system_event!(config, "configuration loaded successfully");

        log_validation!(success, "quiz", "questions validated");
        log_validation!(failure, "quiz", error = error);
    }
}
