//! Task document repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Load task documents by project or by document id.
//! - Run read-validate-mutate-commit cycles inside one immediate transaction.
//!
//! # Invariants
//! - At most one row per project (`UNIQUE(project_id)`).
//! - Every committed row passes `TaskDocument::validate()`.
//! - `updated_at` is refreshed by SQL on every write.

use crate::model::actor::ProjectId;
use crate::model::task_document::{AdminStatus, TaskDocument, TaskDocumentId};
use crate::repo::{table_exists, RepoError, RepoResult};
use crate::storage::ArtifactRef;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const TASK_DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    student_draft_path,
    student_submitted,
    teacher_revision_path,
    teacher_submitted,
    admin_status,
    updated_at
FROM task_documents";

/// Row selector for task document lookups and updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKey {
    Project(ProjectId),
    Document(TaskDocumentId),
}

/// Repository interface for task document persistence.
pub trait TaskDocumentRepository {
    fn get_by_project(&self, project_id: ProjectId) -> RepoResult<Option<TaskDocument>>;
    fn get(&self, id: TaskDocumentId) -> RepoResult<Option<TaskDocument>>;
    /// Documents that have reached the admin queue at least once.
    fn list_in_admin_queue(&self) -> RepoResult<Vec<TaskDocument>>;

    /// Applies `apply` to the current row under an exclusive write scope.
    ///
    /// When `create_missing` is set and `key` is a project, a missing row is
    /// created in the same scope. An `Err` from `apply` rolls everything back,
    /// including the lazily created row.
    fn update_with<T, E, F>(
        &self,
        key: DocumentKey,
        create_missing: bool,
        apply: F,
    ) -> Result<(TaskDocument, T), E>
    where
        F: FnOnce(&mut TaskDocument) -> Result<T, E>,
        E: From<RepoError>;
}

/// SQLite-backed task document repository.
pub struct SqliteTaskDocumentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskDocumentRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        if !table_exists(conn, "task_documents")? {
            return Err(RepoError::MissingRequiredTable("task_documents"));
        }
        Ok(Self { conn })
    }

    fn run_update<T, E, F>(
        &self,
        key: DocumentKey,
        create_missing: bool,
        apply: F,
    ) -> RepoResult<Result<(TaskDocument, T), E>>
    where
        F: FnOnce(&mut TaskDocument) -> Result<T, E>,
    {
        // `new_unchecked` lets the directory share this connection immutably.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let mut document = match (load_document(&tx, key)?, key) {
            (Some(document), _) => document,
            (None, DocumentKey::Project(project_id)) if create_missing => {
                tx.execute(
                    "INSERT INTO task_documents (project_id) VALUES (?1);",
                    [project_id],
                )?;
                load_document(&tx, key)?.ok_or(RepoError::NotFound {
                    entity: "task document",
                    id: project_id,
                })?
            }
            (None, DocumentKey::Project(project_id)) => {
                return Err(RepoError::NotFound {
                    entity: "task document for project",
                    id: project_id,
                });
            }
            (None, DocumentKey::Document(id)) => {
                return Err(RepoError::NotFound {
                    entity: "task document",
                    id,
                });
            }
        };

        let output = match apply(&mut document) {
            Ok(output) => output,
            Err(err) => return Ok(Err(err)),
        };
        document.validate()?;
        write_document(&tx, &document)?;

        let stored = load_document(&tx, DocumentKey::Document(document.id))?.ok_or(
            RepoError::NotFound {
                entity: "task document",
                id: document.id,
            },
        )?;
        tx.commit()?;
        Ok(Ok((stored, output)))
    }
}

impl TaskDocumentRepository for SqliteTaskDocumentRepository<'_> {
    fn get_by_project(&self, project_id: ProjectId) -> RepoResult<Option<TaskDocument>> {
        load_document(self.conn, DocumentKey::Project(project_id))
    }

    fn get(&self, id: TaskDocumentId) -> RepoResult<Option<TaskDocument>> {
        load_document(self.conn, DocumentKey::Document(id))
    }

    fn list_in_admin_queue(&self) -> RepoResult<Vec<TaskDocument>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_DOCUMENT_SELECT_SQL}
             WHERE teacher_submitted = 1
                OR admin_status IS NOT NULL
             ORDER BY updated_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }
        Ok(documents)
    }

    fn update_with<T, E, F>(
        &self,
        key: DocumentKey,
        create_missing: bool,
        apply: F,
    ) -> Result<(TaskDocument, T), E>
    where
        F: FnOnce(&mut TaskDocument) -> Result<T, E>,
        E: From<RepoError>,
    {
        self.run_update(key, create_missing, apply)?
    }
}

fn load_document(conn: &Connection, key: DocumentKey) -> RepoResult<Option<TaskDocument>> {
    let (filter, id) = match key {
        DocumentKey::Project(project_id) => ("project_id", project_id),
        DocumentKey::Document(id) => ("id", id),
    };
    conn.query_row(
        &format!("{TASK_DOCUMENT_SELECT_SQL} WHERE {filter} = ?1;"),
        [id],
        |row| Ok(parse_document_row(row)),
    )
    .optional()?
    .transpose()
}

fn write_document(conn: &Connection, document: &TaskDocument) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE task_documents
         SET
            student_draft_path = ?2,
            student_submitted = ?3,
            teacher_revision_path = ?4,
            teacher_submitted = ?5,
            admin_status = ?6,
            updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
         WHERE id = ?1;",
        params![
            document.id,
            document.student_draft.as_ref().map(ArtifactRef::storage_name),
            bool_to_int(document.student_submitted),
            document.teacher_revision.as_ref().map(ArtifactRef::storage_name),
            bool_to_int(document.teacher_submitted),
            document.admin_status.map(AdminStatus::as_str),
        ],
    )?;

    if changed == 0 {
        return Err(RepoError::NotFound {
            entity: "task document",
            id: document.id,
        });
    }
    Ok(())
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<TaskDocument> {
    let admin_status = match row.get::<_, Option<String>>("admin_status")? {
        Some(value) => Some(AdminStatus::parse(&value).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid admin status `{value}` in task_documents.admin_status"
            ))
        })?),
        None => None,
    };

    let document = TaskDocument {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        student_draft: parse_artifact(row, "student_draft_path")?,
        student_submitted: parse_flag(row, "student_submitted")?,
        teacher_revision: parse_artifact(row, "teacher_revision_path")?,
        teacher_submitted: parse_flag(row, "teacher_submitted")?,
        admin_status,
        updated_at: row.get("updated_at")?,
    };
    document.validate()?;
    Ok(document)
}

fn parse_artifact(row: &Row<'_>, column: &str) -> RepoResult<Option<ArtifactRef>> {
    match row.get::<_, Option<String>>(column)? {
        Some(value) if !value.is_empty() => ArtifactRef::parse(&value).map(Some).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid storage name `{value}` in task_documents.{column}"
            ))
        }),
        _ => Ok(None),
    }
}

fn parse_flag(row: &Row<'_>, column: &str) -> RepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in task_documents.{column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
