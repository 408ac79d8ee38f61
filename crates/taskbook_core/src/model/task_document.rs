//! Task document domain model.
//!
//! # Responsibility
//! - Define the per-project review record and its composite state.
//! - Provide slot accessors and lifecycle helpers for reset semantics.
//!
//! # Invariants
//! - `student_submitted` implies `student_draft` is set.
//! - `teacher_submitted` implies `teacher_revision` is set and
//!   `student_submitted` is set.
//! - `AdminStatus::Approved` is terminal until `reset()`.

use crate::model::actor::{ProjectId, Role};
use crate::storage::ArtifactRef;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TaskDocumentId = i64;

/// One of the two artifact positions on a task document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    StudentDraft,
    TeacherRevision,
}

impl Slot {
    /// Wire value (`student_draft|teacher_revision`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StudentDraft => "student_draft",
            Self::TeacherRevision => "teacher_revision",
        }
    }

    /// Parses a wire value; `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "student_draft" => Some(Self::StudentDraft),
            "teacher_revision" => Some(Self::TeacherRevision),
            _ => None,
        }
    }

    /// The only role allowed to upload into or delete from this slot.
    pub fn owner(self) -> Role {
        match self {
            Self::StudentDraft => Role::Student,
            Self::TeacherRevision => Role::Teacher,
        }
    }
}

/// Which party is forwarding its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitKind {
    Student,
    Teacher,
}

impl SubmitKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
        }
    }

    pub fn required_role(self) -> Role {
        match self {
            Self::Student => Role::Student,
            Self::Teacher => Role::Teacher,
        }
    }
}

/// Administrative decision on a forwarded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Return,
}

impl ReviewDecision {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "approve" => Some(Self::Approve),
            "return" => Some(Self::Return),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Return => "return",
        }
    }
}

/// Administrative status; `None` on the document means unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminStatus {
    Approved,
    Returned,
}

impl AdminStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Returned => "returned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approved" => Some(Self::Approved),
            "returned" => Some(Self::Returned),
            _ => None,
        }
    }
}

/// Derived, read-only projection of the composite state.
///
/// Used for diagnostics; workflow rules always inspect the raw flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStage {
    Empty,
    DraftUploaded,
    AwaitingTeacher,
    AwaitingAdmin,
    Approved,
    Returned,
}

impl DocumentStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::DraftUploaded => "draft_uploaded",
            Self::AwaitingTeacher => "awaiting_teacher",
            Self::AwaitingAdmin => "awaiting_admin",
            Self::Approved => "approved",
            Self::Returned => "returned",
        }
    }
}

/// Per-project review record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDocument {
    pub id: TaskDocumentId,
    pub project_id: ProjectId,
    pub student_draft: Option<ArtifactRef>,
    pub student_submitted: bool,
    pub teacher_revision: Option<ArtifactRef>,
    pub teacher_submitted: bool,
    pub admin_status: Option<AdminStatus>,
    /// Unix epoch milliseconds, refreshed by storage on every write.
    pub updated_at: i64,
}

impl TaskDocument {
    /// Returns a document in the initial empty state.
    pub fn empty(id: TaskDocumentId, project_id: ProjectId) -> Self {
        Self {
            id,
            project_id,
            student_draft: None,
            student_submitted: false,
            teacher_revision: None,
            teacher_submitted: false,
            admin_status: None,
            updated_at: 0,
        }
    }

    pub fn artifact(&self, slot: Slot) -> Option<&ArtifactRef> {
        match slot {
            Slot::StudentDraft => self.student_draft.as_ref(),
            Slot::TeacherRevision => self.teacher_revision.as_ref(),
        }
    }

    /// Replaces the slot's artifact and returns the previous one.
    pub fn replace_artifact(
        &mut self,
        slot: Slot,
        artifact: Option<ArtifactRef>,
    ) -> Option<ArtifactRef> {
        match slot {
            Slot::StudentDraft => std::mem::replace(&mut self.student_draft, artifact),
            Slot::TeacherRevision => std::mem::replace(&mut self.teacher_revision, artifact),
        }
    }

    pub fn is_submitted(&self, slot: Slot) -> bool {
        match slot {
            Slot::StudentDraft => self.student_submitted,
            Slot::TeacherRevision => self.teacher_submitted,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.admin_status == Some(AdminStatus::Approved)
    }

    pub fn is_returned(&self) -> bool {
        self.admin_status == Some(AdminStatus::Returned)
    }

    /// Whether the document has ever reached the admin queue.
    pub fn is_in_admin_queue(&self) -> bool {
        self.teacher_submitted || self.admin_status.is_some()
    }

    /// Restores initial empty values and returns the artifacts that were dropped.
    pub fn reset(&mut self) -> Vec<ArtifactRef> {
        let dropped = [self.student_draft.take(), self.teacher_revision.take()]
            .into_iter()
            .flatten()
            .collect();
        self.student_submitted = false;
        self.teacher_submitted = false;
        self.admin_status = None;
        dropped
    }

    pub fn stage(&self) -> DocumentStage {
        if self.is_approved() {
            return DocumentStage::Approved;
        }
        if self.teacher_submitted {
            return DocumentStage::AwaitingAdmin;
        }
        if self.is_returned() {
            return DocumentStage::Returned;
        }
        if self.student_submitted {
            return DocumentStage::AwaitingTeacher;
        }
        if self.student_draft.is_some() || self.teacher_revision.is_some() {
            return DocumentStage::DraftUploaded;
        }
        DocumentStage::Empty
    }

    /// Checks the flag/path invariants.
    pub fn validate(&self) -> Result<(), TaskDocumentValidationError> {
        if self.student_submitted && self.student_draft.is_none() {
            return Err(TaskDocumentValidationError::SubmittedWithoutArtifact(
                Slot::StudentDraft,
            ));
        }
        if self.teacher_submitted && self.teacher_revision.is_none() {
            return Err(TaskDocumentValidationError::SubmittedWithoutArtifact(
                Slot::TeacherRevision,
            ));
        }
        if self.teacher_submitted && !self.student_submitted {
            return Err(TaskDocumentValidationError::TeacherAheadOfStudent);
        }
        if self.is_approved() && !self.teacher_submitted {
            return Err(TaskDocumentValidationError::ApprovedWithoutSubmission);
        }
        Ok(())
    }
}

/// Invariant violations detected on a task document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDocumentValidationError {
    SubmittedWithoutArtifact(Slot),
    TeacherAheadOfStudent,
    ApprovedWithoutSubmission,
}

impl Display for TaskDocumentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubmittedWithoutArtifact(slot) => {
                write!(f, "{} is marked submitted without an artifact", slot.as_str())
            }
            Self::TeacherAheadOfStudent => {
                write!(f, "teacher revision submitted while student draft is not")
            }
            Self::ApprovedWithoutSubmission => {
                write!(f, "document approved without a teacher submission")
            }
        }
    }
}

impl Error for TaskDocumentValidationError {}
