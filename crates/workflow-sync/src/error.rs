//! Error types for the workflow sync engine

use thiserror::Error;

use crate::types::Issue;

/// Result type alias using WorkflowSyncError
pub type Result<T> = std::result::Result<T, WorkflowSyncError>;

/// Errors that can occur while syncing, validating or persisting a workflow
#[derive(Debug, Error)]
pub enum WorkflowSyncError {
    /// Malformed JSON text (message surfaced verbatim)
    #[error("{0}")]
    Parse(String),

    /// Structural or schema failure; carries the full issue list
    #[error("Validation failed: {message}")]
    Validation { message: String, errors: Vec<Issue> },

    /// The server holds a newer version than the local working copy
    #[error("Version conflict on workflow '{workflow_id}': local version {local_version}, server version {server_version}")]
    VersionConflict {
        workflow_id: String,
        local_version: u64,
        server_version: u64,
    },

    /// A field value fell outside its allowed range
    #[error("{field} must be between {min} and {max} (got {value})")]
    Range {
        field: String,
        value: u32,
        min: u32,
        max: u32,
    },

    /// The store has no workflow with this ID
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// The backing store could not be reached
    #[error("Workflow store unavailable: {0}")]
    StoreUnavailable(String),

    /// The external schema service failed
    #[error("Schema service error: {0}")]
    SchemaService(String),

    /// No workflow has been initialized in the editor
    #[error("No active workflow")]
    NoActiveWorkflow,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowSyncError {
    /// Create a store-unavailable error with a message
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a validation error from a list of issues.
    ///
    /// The first issue's message becomes the surfaced message.
    pub fn validation(errors: Vec<Issue>) -> Self {
        let message = errors
            .first()
            .map(|issue| issue.message.clone())
            .unwrap_or_else(|| "Workflow is invalid".to_string());
        Self::Validation { message, errors }
    }

    /// Whether this error is a server-side version conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
