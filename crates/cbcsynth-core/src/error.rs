//! Error taxonomy for the synthesis pipeline.

use std::path::PathBuf;

/// Errors raised by the remote completion backend for a single call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport fault: {0}")]
    Transport(String),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("invalid backend configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Pipeline errors. Every variant aborts the current run.
#[derive(Debug, thiserror::Error)]
pub enum CbcError {
    #[error("no PRE/POST specification found in {source_name}")]
    SpecNotFound { source_name: String },

    #[error("missing collaborator file: {}", path.display())]
    MissingCollaboratorFile { path: PathBuf },

    #[error("statement {id} not present in model {}", model.display())]
    UnknownStatement { id: String, model: PathBuf },

    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("no synthesis hole or program block to splice into")]
    SpliceLocationNotFound,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, CbcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_not_found_names_source() {
        let err = CbcError::SpecNotFound {
            source_name: "Statement3.key".to_string(),
        };
        assert!(err.to_string().contains("Statement3.key"));
    }

    #[test]
    fn test_missing_collaborator_shows_path() {
        let err = CbcError::MissingCollaboratorFile {
            path: PathBuf::from("/opt/key/key-2.13.0-exe.jar"),
        };
        assert!(err.to_string().contains("key-2.13.0-exe.jar"));
    }

    #[test]
    fn test_backend_status_error_display() {
        let err = BackendError::Status {
            status: 429,
            body: "rate limited".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("rate limited"));
    }
}
