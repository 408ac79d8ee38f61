//! Core domain logic for the graduation task document pipeline.
//! This crate is the single source of truth for workflow invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod storage;

pub use logging::{default_log_level, init_logging, logging_status, LoggingOptions};
pub use model::actor::{Caller, Project, ProjectId, Role, UserId};
pub use model::task_document::{
    AdminStatus, DocumentStage, ReviewDecision, Slot, SubmitKind, TaskDocument, TaskDocumentId,
    TaskDocumentValidationError,
};
pub use repo::directory::{
    ActorDirectory, ProjectRegistry, SqliteActorDirectory, SqliteProjectRegistry,
};
pub use repo::task_document_repo::{
    DocumentKey, SqliteTaskDocumentRepository, TaskDocumentRepository,
};
pub use repo::{RepoError, RepoResult};
pub use service::error::{WorkflowError, WorkflowResult};
pub use service::snapshot::TaskDocumentSnapshot;
pub use service::workflow::{ArtifactDownload, TaskWorkflow, UploadRequest, ALLOWED_EXTENSIONS};
pub use storage::{ArtifactRef, ArtifactStore, FsArtifactStore, StorageError, StorageResult};

/// Workflow engine wired to SQLite persistence and filesystem blobs.
pub type SqliteTaskWorkflow<'conn> = TaskWorkflow<
    SqliteTaskDocumentRepository<'conn>,
    SqliteProjectRegistry<'conn>,
    FsArtifactStore,
>;

/// Builds a [`SqliteTaskWorkflow`] sharing one migrated connection.
pub fn sqlite_workflow(
    conn: &rusqlite::Connection,
    store: FsArtifactStore,
) -> RepoResult<SqliteTaskWorkflow<'_>> {
    Ok(TaskWorkflow::new(
        SqliteTaskDocumentRepository::try_new(conn)?,
        SqliteProjectRegistry::try_new(conn)?,
        store,
    ))
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
