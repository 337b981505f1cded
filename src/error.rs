use thiserror::Error;

use crate::db::DbError;
use crate::inference::InferenceOperation;
use crate::pipeline::Stage;
use crate::translation::TextKind;

/// Failures of the upload pipeline and the photo read paths.
///
/// External collaborators' own error types never appear here: each gateway
/// flattens them into a message so callers only match on what failed.
#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Failed to store object {key}: {reason}")]
    Storage { key: String, reason: String },

    #[error("Failed to sign URL for {key}: {reason}")]
    Signing { key: String, reason: String },

    #[error("Inference {operation} failed: {reason}")]
    Inference {
        operation: InferenceOperation,
        reason: String,
    },

    #[error("Translation of {kind} text failed: {reason}")]
    Translation { kind: TextKind, reason: String },

    /// A stage needed the output of an earlier stage that degraded.
    #[error("Stage {stage} has no {input} to work with")]
    MissingInput { stage: Stage, input: &'static str },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error(transparent)]
    Database(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, AnnotationError>;
