//! Task document workflow engine.
//!
//! # Responsibility
//! - Validate every requested transition against caller role and document state.
//! - Coordinate artifact side effects with the document commit.
//! - Resolve the target project explicitly or through the project registry.
//!
//! # Invariants
//! - Each mutation runs inside one repository write scope (read, validate,
//!   mutate, commit), so concurrent callers never interleave on one document.
//! - No blob is written when a precondition fails.
//! - On replacement the previous blob is deleted only after the commit.
//! - Blob deletion is best effort; failures are logged, never surfaced.
//! - `AdminStatus::Approved` is only left through `reset_task_document`.

use crate::model::actor::{Caller, Project, ProjectId, Role};
use crate::model::task_document::{
    AdminStatus, ReviewDecision, Slot, SubmitKind, TaskDocument, TaskDocumentId,
};
use crate::repo::directory::ProjectRegistry;
use crate::repo::task_document_repo::{DocumentKey, TaskDocumentRepository};
use crate::service::error::{WorkflowError, WorkflowResult};
use crate::service::snapshot::TaskDocumentSnapshot;
use crate::storage::{file_extension, ArtifactRef, ArtifactStore};
use log::{info, warn};
use std::time::Instant;

/// Accepted upload extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];

/// Input for [`TaskWorkflow::upload_artifact`].
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// Explicit project; `None` resolves the caller's own project.
    pub project_id: Option<ProjectId>,
    pub slot: Slot,
    pub file_name: &'a str,
    pub bytes: &'a [u8],
}

/// Opened artifact ready for delivery.
pub struct ArtifactDownload<R> {
    pub display_name: String,
    pub reader: R,
}

/// Workflow engine over a document repository, a project registry and a blob store.
pub struct TaskWorkflow<R, P, S> {
    documents: R,
    projects: P,
    store: S,
}

impl<R, P, S> TaskWorkflow<R, P, S>
where
    R: TaskDocumentRepository,
    P: ProjectRegistry,
    S: ArtifactStore,
{
    pub fn new(documents: R, projects: P, store: S) -> Self {
        Self {
            documents,
            projects,
            store,
        }
    }

    /// Stores a new artifact in `request.slot`, replacing any previous one.
    ///
    /// The document is created lazily on the first upload for a project.
    /// Submitted flags are left untouched.
    ///
    /// # Errors
    /// - `InvalidInput` for a missing name or a disallowed extension.
    /// - `Forbidden` when the caller does not own the slot.
    /// - `NotFound` when no project resolves.
    /// - `InvalidState` when the document is approved.
    /// - `Storage` when the blob cannot be written.
    pub fn upload_artifact(
        &self,
        caller: &Caller,
        request: UploadRequest<'_>,
    ) -> WorkflowResult<TaskDocument> {
        let started_at = Instant::now();
        validate_upload_name(request.file_name)?;
        ensure_slot_owner(caller, request.slot)?;
        let project = self.resolve_project(caller, request.project_id)?;

        let mut stored: Option<ArtifactRef> = None;
        let outcome = self.documents.update_with(
            DocumentKey::Project(project.id),
            true,
            |document| -> WorkflowResult<Option<ArtifactRef>> {
                if document.is_approved() {
                    return Err(WorkflowError::InvalidState(
                        "task document already approved, cannot upload",
                    ));
                }
                let artifact = self.store.save(request.bytes, request.file_name)?;
                stored = Some(artifact.clone());
                Ok(document.replace_artifact(request.slot, Some(artifact)))
            },
        );

        match outcome {
            Ok((document, previous)) => {
                if let Some(previous) = previous {
                    self.discard_artifact(&previous);
                }
                info!(
                    "event=task_upload module=workflow status=ok project_id={} slot={} bytes={} stage={} duration_ms={}",
                    project.id,
                    request.slot.as_str(),
                    request.bytes.len(),
                    document.stage().as_str(),
                    started_at.elapsed().as_millis()
                );
                Ok(document)
            }
            Err(err) => {
                if let Some(orphan) = stored {
                    self.discard_artifact(&orphan);
                }
                Err(log_rejection("task_upload", project.id, err))
            }
        }
    }

    /// Forwards the caller's artifact to the next reviewing party.
    ///
    /// # Errors
    /// - `Forbidden` when `kind` does not match the caller role.
    /// - `NotFound` when no project or no document exists.
    /// - `PreconditionFailed` naming the unmet condition.
    pub fn submit_artifact(
        &self,
        caller: &Caller,
        project_id: Option<ProjectId>,
        kind: SubmitKind,
    ) -> WorkflowResult<TaskDocument> {
        if caller.role != kind.required_role() {
            return Err(WorkflowError::Forbidden(match kind {
                SubmitKind::Student => "only students can submit drafts",
                SubmitKind::Teacher => "only teachers can submit revisions",
            }));
        }
        let project = self.resolve_project(caller, project_id)?;

        let (document, ()) = self
            .documents
            .update_with(DocumentKey::Project(project.id), false, |document| {
                apply_submit(document, kind)
            })
            .map_err(|err| log_rejection("task_submit", project.id, err))?;

        info!(
            "event=task_submit module=workflow status=ok project_id={} kind={} stage={}",
            project.id,
            kind.as_str(),
            document.stage().as_str()
        );
        Ok(document)
    }

    /// Applies an administrative decision to a forwarded document.
    ///
    /// Returning an already returned, not yet resubmitted document is a no-op.
    ///
    /// # Errors
    /// - `Forbidden` for non-admin callers.
    /// - `NotFound` for an unknown document.
    /// - `PreconditionFailed` when nothing is awaiting review.
    pub fn review_task_document(
        &self,
        caller: &Caller,
        document_id: TaskDocumentId,
        decision: ReviewDecision,
    ) -> WorkflowResult<TaskDocument> {
        ensure_admin(caller)?;

        let (document, ()) = self
            .documents
            .update_with(DocumentKey::Document(document_id), false, |document| {
                apply_review(document, decision)
            })
            .map_err(|err| log_rejection("task_review", document_id, err))?;

        info!(
            "event=task_review module=workflow status=ok document_id={} decision={} stage={}",
            document_id,
            decision.as_str(),
            document.stage().as_str()
        );
        Ok(document)
    }

    /// Removes the caller's artifact from `slot`.
    ///
    /// On a returned document that was already resubmitted, deleting withdraws
    /// the submissions that depended on the artifact.
    ///
    /// # Errors
    /// - `Forbidden` when the caller does not own the slot.
    /// - `NotFound` when no project or no document exists.
    /// - `Conflict` when the artifact is submitted and pending, or approved.
    pub fn delete_artifact(
        &self,
        caller: &Caller,
        project_id: Option<ProjectId>,
        slot: Slot,
    ) -> WorkflowResult<TaskDocument> {
        ensure_slot_owner(caller, slot)?;
        let project = self.resolve_project(caller, project_id)?;

        let (document, removed) = self
            .documents
            .update_with(DocumentKey::Project(project.id), false, |document| {
                apply_delete(document, slot)
            })
            .map_err(|err| log_rejection("task_delete_file", project.id, err))?;

        if let Some(removed) = removed.as_ref() {
            self.discard_artifact(removed);
        }
        info!(
            "event=task_delete_file module=workflow status=ok project_id={} slot={} removed={}",
            project.id,
            slot.as_str(),
            removed.is_some()
        );
        Ok(document)
    }

    /// Restores a document to its initial empty state and drops both blobs.
    ///
    /// # Errors
    /// - `Forbidden` for non-admin callers.
    /// - `NotFound` for an unknown document.
    pub fn reset_task_document(
        &self,
        caller: &Caller,
        document_id: TaskDocumentId,
    ) -> WorkflowResult<TaskDocument> {
        ensure_admin(caller)?;

        let (document, dropped) = self
            .documents
            .update_with(
                DocumentKey::Document(document_id),
                false,
                |document| -> WorkflowResult<Vec<ArtifactRef>> { Ok(document.reset()) },
            )
            .map_err(|err| log_rejection("task_reset", document_id, err))?;

        for artifact in &dropped {
            self.discard_artifact(artifact);
        }
        info!(
            "event=task_reset module=workflow status=ok document_id={} dropped_artifacts={}",
            document_id,
            dropped.len()
        );
        Ok(document)
    }

    /// Lists documents that have ever reached the admin queue.
    pub fn list_pending(&self, caller: &Caller) -> WorkflowResult<Vec<TaskDocument>> {
        ensure_admin(caller)?;
        Ok(self.documents.list_in_admin_queue()?)
    }

    /// Returns the caller's current document view.
    ///
    /// Without a resolvable project, or before the first upload, an empty
    /// snapshot is returned. Admins must name a project explicitly.
    pub fn task_info(
        &self,
        caller: &Caller,
        project_id: Option<ProjectId>,
    ) -> WorkflowResult<TaskDocumentSnapshot> {
        let project = match (project_id, caller.role) {
            (Some(project_id), _) => Some(self.explicit_project(caller, project_id)?),
            (None, Role::Admin) => None,
            (None, role) => self
                .projects
                .find_project_by_participant(caller.id, role)?,
        };

        let Some(project) = project else {
            return Ok(TaskDocumentSnapshot::empty(None));
        };
        match self.documents.get_by_project(project.id)? {
            Some(document) => Ok(TaskDocumentSnapshot::from_document(&document, Some(&project))),
            None => Ok(TaskDocumentSnapshot::empty(Some(&project))),
        }
    }

    /// Builds the wire view of `document`, joining participant names.
    pub fn snapshot(&self, document: &TaskDocument) -> WorkflowResult<TaskDocumentSnapshot> {
        let project = self.projects.get_project(document.project_id)?;
        Ok(TaskDocumentSnapshot::from_document(
            document,
            project.as_ref(),
        ))
    }

    /// Opens one artifact of a document for download.
    ///
    /// # Errors
    /// - `NotFound` for an unknown document or project, an empty slot, or a
    ///   missing blob.
    /// - `Forbidden` when the caller is neither participant nor admin.
    pub fn open_artifact(
        &self,
        caller: &Caller,
        document_id: TaskDocumentId,
        slot: Slot,
    ) -> WorkflowResult<ArtifactDownload<S::Reader>> {
        let document = self
            .documents
            .get(document_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("task document not found: {document_id}")))?;
        let project = self
            .projects
            .get_project(document.project_id)?
            .ok_or_else(|| WorkflowError::NotFound("project not found".to_string()))?;
        if !project.admits(caller) {
            return Err(WorkflowError::Forbidden(
                "only the project's student, teacher or an admin may download",
            ));
        }

        let artifact = document
            .artifact(slot)
            .ok_or_else(|| WorkflowError::NotFound("file not found".to_string()))?;
        let reader = self.store.open(artifact)?;
        info!(
            "event=task_download module=workflow status=ok document_id={} slot={}",
            document_id,
            slot.as_str()
        );
        Ok(ArtifactDownload {
            display_name: self.store.resolve_download_name(artifact),
            reader,
        })
    }

    fn resolve_project(
        &self,
        caller: &Caller,
        project_id: Option<ProjectId>,
    ) -> WorkflowResult<Project> {
        match project_id {
            Some(project_id) => self.explicit_project(caller, project_id),
            None => {
                if caller.role == Role::Admin {
                    return Err(WorkflowError::InvalidInput(
                        "projectId is required for admin callers".to_string(),
                    ));
                }
                self.projects
                    .find_project_by_participant(caller.id, caller.role)?
                    .ok_or_else(|| WorkflowError::NotFound("project not found".to_string()))
            }
        }
    }

    fn explicit_project(&self, caller: &Caller, project_id: ProjectId) -> WorkflowResult<Project> {
        let project = self
            .projects
            .get_project(project_id)?
            .ok_or_else(|| WorkflowError::NotFound("project not found".to_string()))?;
        if !project.admits(caller) {
            return Err(WorkflowError::Forbidden("caller does not participate in this project"));
        }
        Ok(project)
    }

    fn discard_artifact(&self, artifact: &ArtifactRef) {
        if let Err(err) = self.store.delete(artifact) {
            warn!(
                "event=artifact_discard module=workflow status=error error_code=orphaned_blob error={}",
                err
            );
        }
    }
}

fn validate_upload_name(file_name: &str) -> WorkflowResult<()> {
    if file_name.trim().is_empty() {
        return Err(WorkflowError::InvalidInput("no file selected".to_string()));
    }
    match file_extension(file_name) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(WorkflowError::InvalidInput(
            "file type not allowed".to_string(),
        )),
    }
}

fn ensure_slot_owner(caller: &Caller, slot: Slot) -> WorkflowResult<()> {
    if caller.role == slot.owner() {
        return Ok(());
    }
    Err(WorkflowError::Forbidden(match slot {
        Slot::StudentDraft => "only students may change the student draft",
        Slot::TeacherRevision => "only teachers may change the teacher revision",
    }))
}

fn ensure_admin(caller: &Caller) -> WorkflowResult<()> {
    if caller.role == Role::Admin {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden("admin role required"))
    }
}

fn apply_submit(document: &mut TaskDocument, kind: SubmitKind) -> WorkflowResult<()> {
    if document.is_approved() {
        return Err(WorkflowError::PreconditionFailed(
            "task document already approved, cannot resubmit",
        ));
    }
    match kind {
        SubmitKind::Student => {
            if document.student_draft.is_none() {
                return Err(WorkflowError::PreconditionFailed("no draft file uploaded"));
            }
            document.student_submitted = true;
        }
        SubmitKind::Teacher => {
            if document.teacher_revision.is_none() {
                return Err(WorkflowError::PreconditionFailed("no revision file uploaded"));
            }
            if !document.student_submitted {
                return Err(WorkflowError::PreconditionFailed(
                    "student draft not submitted yet",
                ));
            }
            document.teacher_submitted = true;
        }
    }
    Ok(())
}

fn apply_review(document: &mut TaskDocument, decision: ReviewDecision) -> WorkflowResult<()> {
    if document.is_approved() {
        return Err(WorkflowError::PreconditionFailed(
            "task document already approved",
        ));
    }
    if !document.teacher_submitted {
        if decision == ReviewDecision::Return && document.is_returned() {
            return Ok(());
        }
        return Err(WorkflowError::PreconditionFailed(
            "task not submitted by teacher yet",
        ));
    }
    match decision {
        ReviewDecision::Approve => {
            document.admin_status = Some(AdminStatus::Approved);
        }
        ReviewDecision::Return => {
            document.admin_status = Some(AdminStatus::Returned);
            document.student_submitted = false;
            document.teacher_submitted = false;
        }
    }
    Ok(())
}

fn apply_delete(document: &mut TaskDocument, slot: Slot) -> WorkflowResult<Option<ArtifactRef>> {
    if document.is_approved() {
        return Err(WorkflowError::Conflict(
            "task document already approved, cannot delete file",
        ));
    }
    if document.is_submitted(slot) && !document.is_returned() {
        return Err(WorkflowError::Conflict("cannot delete submitted file"));
    }
    match slot {
        Slot::StudentDraft => {
            // The teacher's submission rests on the student's.
            document.student_submitted = false;
            document.teacher_submitted = false;
        }
        Slot::TeacherRevision => document.teacher_submitted = false,
    }
    Ok(document.replace_artifact(slot, None))
}

fn log_rejection(event: &'static str, target_id: i64, err: WorkflowError) -> WorkflowError {
    warn!(
        "event={event} module=workflow status=error target_id={target_id} error_code={}",
        err.code()
    );
    err
}
