use thiserror::Error;

/// Failures raised while reading or writing a single node.
///
/// Matching converts these into per-node diagnostics; every later stage
/// propagates them and aborts the run.
#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Node '{node}' carries a malformed matches_json payload: {source}")]
    MalformedMatchPayload {
        node: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Node '{node}' field '{field}' expects a number, got {value}")]
    InvalidMeasure {
        node: String,
        field: String,
        value: serde_json::Value,
    },

    #[error("Node '{node}' has no '{field}' value")]
    MissingMeasure { node: String, field: String },

    #[error("Node '{node}' field '{field}' expects {expected}, got {value}")]
    InvalidField {
        node: String,
        field: String,
        expected: &'static str,
        value: serde_json::Value,
    },

    #[error("Field '{0}' is reserved and cannot be assigned")]
    ReservedField(String),
}

pub type Result<T> = std::result::Result<T, AnnotateError>;
