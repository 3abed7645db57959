use std::sync::Arc;

use evidence_lang::{CompileError, RuntimeError};

use crate::subject::QualifiedName;

/// A live contract check that did not hold.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractViolation {
    #[error("precondition #{index} of {function} failed: {message}")]
    Precondition {
        function: QualifiedName,
        index: usize,
        message: String,
    },
    #[error("postcondition #{index} of {function} failed: {message}")]
    Postcondition {
        function: QualifiedName,
        index: usize,
        message: String,
    },
}

impl ContractViolation {
    pub fn message(&self) -> &str {
        match self {
            ContractViolation::Precondition { message, .. }
            | ContractViolation::Postcondition { message, .. } => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Contract(#[from] ContractViolation),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("no generator available for type `{ty}`")]
    Synthesis { ty: String },
    #[error("example search aborted: {reason}")]
    Search { reason: String },
    #[error("mutant failed to compile: {0}")]
    Compile(#[from] CompileError),
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
    #[error("failed to serialize report: {0}")]
    Json(Arc<serde_json::Error>),
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(Arc::new(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
