//! Wire projection of a task document.

use crate::model::actor::{Project, ProjectId};
use crate::model::task_document::{AdminStatus, TaskDocument, TaskDocumentId};
use crate::storage::ArtifactRef;
use serde::{Serialize, Serializer};

/// Client-facing document view.
///
/// Flags serialize as `0|1`; an all-empty snapshot has `id = null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDocumentSnapshot {
    pub id: Option<TaskDocumentId>,
    pub project_id: Option<ProjectId>,
    pub student_name: Option<String>,
    pub teacher_name: Option<String>,
    pub student_draft_path: Option<ArtifactRef>,
    #[serde(serialize_with = "flag_as_int")]
    pub student_submitted: bool,
    pub teacher_revision_path: Option<ArtifactRef>,
    #[serde(serialize_with = "flag_as_int")]
    pub teacher_submitted: bool,
    pub admin_status: Option<AdminStatus>,
    /// Unix epoch milliseconds.
    pub updated_at: Option<i64>,
}

impl TaskDocumentSnapshot {
    /// Snapshot for a caller without a project or a project without a document.
    pub fn empty(project: Option<&Project>) -> Self {
        Self {
            id: None,
            project_id: project.map(|project| project.id),
            student_name: project.and_then(|project| project.student_name.clone()),
            teacher_name: project.and_then(|project| project.teacher_name.clone()),
            student_draft_path: None,
            student_submitted: false,
            teacher_revision_path: None,
            teacher_submitted: false,
            admin_status: None,
            updated_at: None,
        }
    }

    pub fn from_document(document: &TaskDocument, project: Option<&Project>) -> Self {
        Self {
            id: Some(document.id),
            project_id: Some(document.project_id),
            student_name: project.and_then(|project| project.student_name.clone()),
            teacher_name: project.and_then(|project| project.teacher_name.clone()),
            student_draft_path: document.student_draft.clone(),
            student_submitted: document.student_submitted,
            teacher_revision_path: document.teacher_revision.clone(),
            teacher_submitted: document.teacher_submitted,
            admin_status: document.admin_status,
            updated_at: Some(document.updated_at),
        }
    }
}

fn flag_as_int<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}
