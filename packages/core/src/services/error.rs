//! Service Layer Error Types
//!
//! Error taxonomy of the validation engine, sliver projection and the
//! ARM→ADM→CBM→BQM pipeline. Validation never fails fast: a
//! `ValidationFailed` carries the complete violation list so a caller sees
//! every defect in one pass.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::services::validation::ValidationReport;

/// Errors surfaced by the model services.
#[derive(Error, Debug)]
pub enum ModelError {
    /// One or more validation rules failed; always recoverable, the caller
    /// fixes the input and retries
    #[error("Validation failed for graph {}: {:?}", .0.graph_id, .0.violations)]
    ValidationFailed(ValidationReport),

    /// A property is present but undecodable against its structured type
    #[error("Schema error on node {node_id}, property {prop}: {detail}")]
    SchemaError {
        node_id: String,
        prop: String,
        detail: String,
    },

    /// Required ownership/adjacency missing during projection despite
    /// validation having passed; a validation/projection contract
    /// mismatch, treated as a defect rather than a user error
    #[error("Integrity error on node {node_id}: {detail}")]
    IntegrityError { node_id: String, detail: String },

    /// Two distinct sources disagree on invariant properties of the same
    /// NodeID; surfaced, never silently resolved
    #[error("Merge conflict on node {node_id}: {detail}")]
    MergeConflict { node_id: String, detail: String },

    /// Exchange-format parse/serialize failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// The reservation/calendar collaborator failed
    #[error("Reservation provider failed: {0}")]
    Reservation(#[source] anyhow::Error),

    /// Underlying store failure (includes NotFound for graphs and nodes)
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),
}

impl ModelError {
    pub fn schema_error(
        node_id: impl Into<String>,
        prop: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::SchemaError {
            node_id: node_id.into(),
            prop: prop.into(),
            detail: detail.into(),
        }
    }

    pub fn integrity_error(node_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::IntegrityError {
            node_id: node_id.into(),
            detail: detail.into(),
        }
    }

    pub fn merge_conflict(node_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MergeConflict {
            node_id: node_id.into(),
            detail: detail.into(),
        }
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }
}
