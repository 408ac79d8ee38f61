//! Workflow error taxonomy.

use crate::repo::RepoError;
use crate::storage::StorageError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors surfaced by task document workflow operations.
#[derive(Debug)]
pub enum WorkflowError {
    /// No resolvable caller.
    Unauthenticated,
    /// Caller role may not perform the requested action.
    Forbidden(&'static str),
    /// Project, document or artifact is absent.
    NotFound(String),
    /// Bad file type or missing required field.
    InvalidInput(String),
    /// Current state does not permit the transition.
    PreconditionFailed(&'static str),
    /// Document is in the terminal approved state.
    InvalidState(&'static str),
    /// Artifact is immutable in the current state.
    Conflict(&'static str),
    /// Blob write/read failed.
    Storage(StorageError),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl WorkflowError {
    /// Stable machine-readable code used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::InvalidState(_) => "invalid_state",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage_failure",
            Self::Repo(_) => "repo_failure",
        }
    }
}

impl Display for WorkflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "unauthorized"),
            Self::Forbidden(details) => write!(f, "forbidden: {details}"),
            Self::NotFound(details) => write!(f, "{details}"),
            Self::InvalidInput(details) => write!(f, "{details}"),
            Self::PreconditionFailed(details) => write!(f, "{details}"),
            Self::InvalidState(details) => write!(f, "{details}"),
            Self::Conflict(details) => write!(f, "{details}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for WorkflowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for WorkflowError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            other => Self::Repo(other),
        }
    }
}

impl From<StorageError> for WorkflowError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(_) => Self::NotFound("file not found on server".to_string()),
            other => Self::Storage(other),
        }
    }
}
