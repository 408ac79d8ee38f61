use rusqlite::{params, Connection};
use std::io::Read;
use std::path::Path;
use taskbook_core::db::{open_db_in_memory, seed_demo_data, DemoSeed};
use taskbook_core::{
    sqlite_workflow, AdminStatus, ArtifactRef, ArtifactStore, Caller, DocumentStage,
    FsArtifactStore, ReviewDecision, Role, Slot, SqliteProjectRegistry,
    SqliteTaskDocumentRepository, SqliteTaskWorkflow, StorageError, StorageResult, SubmitKind,
    TaskDocument, TaskDocumentRepository, TaskWorkflow, UploadRequest, WorkflowError,
};
use tempfile::TempDir;

struct Fixture {
    conn: Connection,
    seed: DemoSeed,
    uploads: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let mut conn = open_db_in_memory().unwrap();
        let seed = seed_demo_data(&mut conn).unwrap().unwrap();
        Self {
            conn,
            seed,
            uploads: tempfile::tempdir().unwrap(),
        }
    }

    fn workflow(&self) -> SqliteTaskWorkflow<'_> {
        let store = FsArtifactStore::open(self.uploads.path()).unwrap();
        sqlite_workflow(&self.conn, store).unwrap()
    }

    fn student(&self) -> Caller {
        Caller::new(self.seed.student_id, Role::Student)
    }

    fn teacher(&self) -> Caller {
        Caller::new(self.seed.teacher_id, Role::Teacher)
    }

    fn admin(&self) -> Caller {
        Caller::new(self.seed.admin_id, Role::Admin)
    }

    fn blob_count(&self) -> usize {
        count_files(self.uploads.path())
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn upload(slot: Slot, file_name: &str) -> UploadRequest<'_> {
    UploadRequest {
        project_id: None,
        slot,
        file_name,
        bytes: b"document body",
    }
}

fn assert_invariants(document: &TaskDocument) {
    if document.student_submitted {
        assert!(document.student_draft.is_some());
    }
    if document.teacher_submitted {
        assert!(document.teacher_revision.is_some());
        assert!(document.student_submitted);
    }
}

/// Drives a fresh document to awaiting-admin and returns its id.
fn reach_awaiting_admin(fixture: &Fixture) -> i64 {
    let workflow = fixture.workflow();
    let draft = workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "draft.pdf"))
        .unwrap();
    assert_invariants(&draft);
    let submitted = workflow
        .submit_artifact(&fixture.student(), None, SubmitKind::Student)
        .unwrap();
    assert_eq!(submitted.stage(), DocumentStage::AwaitingTeacher);
    workflow
        .upload_artifact(
            &fixture.teacher(),
            upload(Slot::TeacherRevision, "revision.docx"),
        )
        .unwrap();
    let forwarded = workflow
        .submit_artifact(&fixture.teacher(), None, SubmitKind::Teacher)
        .unwrap();
    assert_invariants(&forwarded);
    assert_eq!(forwarded.stage(), DocumentStage::AwaitingAdmin);
    forwarded.id
}

#[test]
fn full_cycle_ends_approved_with_both_artifacts() {
    let fixture = Fixture::new();
    let document_id = reach_awaiting_admin(&fixture);

    let approved = fixture
        .workflow()
        .review_task_document(&fixture.admin(), document_id, ReviewDecision::Approve)
        .unwrap();

    assert!(approved.student_submitted);
    assert!(approved.teacher_submitted);
    assert_eq!(approved.admin_status, Some(AdminStatus::Approved));
    assert!(approved.student_draft.is_some());
    assert!(approved.teacher_revision.is_some());
    assert_eq!(approved.project_id, fixture.seed.project_id);
    assert_eq!(fixture.blob_count(), 2);
}

#[test]
fn return_then_resubmit_without_new_uploads_reaches_admin_again() {
    let fixture = Fixture::new();
    let document_id = reach_awaiting_admin(&fixture);
    let workflow = fixture.workflow();

    let returned = workflow
        .review_task_document(&fixture.admin(), document_id, ReviewDecision::Return)
        .unwrap();
    assert!(!returned.student_submitted);
    assert!(!returned.teacher_submitted);
    assert_eq!(returned.admin_status, Some(AdminStatus::Returned));
    assert!(returned.student_draft.is_some());
    assert!(returned.teacher_revision.is_some());

    let again = workflow
        .review_task_document(&fixture.admin(), document_id, ReviewDecision::Return)
        .unwrap();
    assert_eq!(again.student_draft, returned.student_draft);
    assert_eq!(again.teacher_revision, returned.teacher_revision);
    assert_eq!(again.stage(), DocumentStage::Returned);

    workflow
        .submit_artifact(&fixture.student(), None, SubmitKind::Student)
        .unwrap();
    let resubmitted = workflow
        .submit_artifact(&fixture.teacher(), None, SubmitKind::Teacher)
        .unwrap();
    assert_eq!(resubmitted.stage(), DocumentStage::AwaitingAdmin);
    assert_eq!(resubmitted.student_draft, returned.student_draft);

    let approved = workflow
        .review_task_document(&fixture.admin(), document_id, ReviewDecision::Approve)
        .unwrap();
    assert!(approved.is_approved());
}

#[test]
fn approved_document_is_a_fixed_point_until_reset() {
    let fixture = Fixture::new();
    let document_id = reach_awaiting_admin(&fixture);
    let workflow = fixture.workflow();
    let approved = workflow
        .review_task_document(&fixture.admin(), document_id, ReviewDecision::Approve)
        .unwrap();

    let err = workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "late.pdf"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    let err = workflow
        .submit_artifact(&fixture.teacher(), None, SubmitKind::Teacher)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::PreconditionFailed(_)));

    let err = workflow
        .delete_artifact(&fixture.student(), None, Slot::StudentDraft)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));

    for decision in [ReviewDecision::Approve, ReviewDecision::Return] {
        let err = workflow
            .review_task_document(&fixture.admin(), document_id, decision)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
    }

    let current = SqliteTaskDocumentRepository::try_new(&fixture.conn)
        .unwrap()
        .get(document_id)
        .unwrap()
        .unwrap();
    assert_eq!(current, approved);
    assert_eq!(fixture.blob_count(), 2);

    let reset = workflow
        .reset_task_document(&fixture.admin(), document_id)
        .unwrap();
    assert_eq!(reset.stage(), DocumentStage::Empty);
    assert_eq!(reset.id, document_id);
    assert_eq!(fixture.blob_count(), 0);
}

#[test]
fn reset_document_leaves_the_admin_queue() {
    let fixture = Fixture::new();
    let document_id = reach_awaiting_admin(&fixture);
    let workflow = fixture.workflow();

    let pending = workflow.list_pending(&fixture.admin()).unwrap();
    assert_eq!(pending.len(), 1);

    workflow
        .review_task_document(&fixture.admin(), document_id, ReviewDecision::Return)
        .unwrap();
    assert_eq!(workflow.list_pending(&fixture.admin()).unwrap().len(), 1);

    workflow
        .reset_task_document(&fixture.admin(), document_id)
        .unwrap();
    assert!(workflow.list_pending(&fixture.admin()).unwrap().is_empty());

    let err = workflow.list_pending(&fixture.teacher()).unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));
}

#[test]
fn deleting_a_pending_draft_conflicts_until_returned() {
    let fixture = Fixture::new();
    let document_id = reach_awaiting_admin(&fixture);
    let workflow = fixture.workflow();

    let err = workflow
        .delete_artifact(&fixture.student(), None, Slot::StudentDraft)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));
    assert_eq!(fixture.blob_count(), 2);

    workflow
        .review_task_document(&fixture.admin(), document_id, ReviewDecision::Return)
        .unwrap();
    let after_delete = workflow
        .delete_artifact(&fixture.student(), None, Slot::StudentDraft)
        .unwrap();
    assert!(after_delete.student_draft.is_none());
    assert!(after_delete.teacher_revision.is_some());
    assert_invariants(&after_delete);
    assert_eq!(fixture.blob_count(), 1);

    let err = workflow
        .submit_artifact(&fixture.student(), None, SubmitKind::Student)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::PreconditionFailed("no draft file uploaded")
    ));
}

#[test]
fn delete_requires_slot_owner() {
    let fixture = Fixture::new();
    let workflow = fixture.workflow();
    workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "draft.pdf"))
        .unwrap();

    let err = workflow
        .delete_artifact(&fixture.teacher(), None, Slot::StudentDraft)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    let cleared = workflow
        .delete_artifact(&fixture.student(), None, Slot::StudentDraft)
        .unwrap();
    assert!(cleared.student_draft.is_none());
    assert_eq!(fixture.blob_count(), 0);
}

#[test]
fn replacing_an_artifact_removes_the_previous_blob() {
    let fixture = Fixture::new();
    let workflow = fixture.workflow();

    let first = workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "v1.pdf"))
        .unwrap();
    let second = workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "v2.doc"))
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_ne!(first.student_draft, second.student_draft);
    assert_eq!(
        second.student_draft.as_ref().map(ArtifactRef::file_name),
        Some("v2.doc")
    );
    assert_eq!(fixture.blob_count(), 1);
}

#[test]
fn rejected_uploads_write_no_blob_and_create_no_document() {
    let fixture = Fixture::new();
    let workflow = fixture.workflow();

    let err = workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "tool.exe"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidInput(_)));

    let err = workflow
        .upload_artifact(&fixture.teacher(), upload(Slot::StudentDraft, "draft.pdf"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    let err = workflow
        .upload_artifact(&fixture.admin(), upload(Slot::TeacherRevision, "r.pdf"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    let err = workflow
        .upload_artifact(
            &fixture.student(),
            UploadRequest {
                project_id: Some(fixture.seed.project_id + 100),
                ..upload(Slot::StudentDraft, "draft.pdf")
            },
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));

    assert_eq!(fixture.blob_count(), 0);
    let repo = SqliteTaskDocumentRepository::try_new(&fixture.conn).unwrap();
    assert!(repo
        .get_by_project(fixture.seed.project_id)
        .unwrap()
        .is_none());
}

struct FailingStore;

impl ArtifactStore for FailingStore {
    type Reader = std::io::Empty;

    fn save(&self, _bytes: &[u8], _original_name: &str) -> StorageResult<ArtifactRef> {
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }

    fn delete(&self, _artifact: &ArtifactRef) -> StorageResult<()> {
        Ok(())
    }

    fn open(&self, artifact: &ArtifactRef) -> StorageResult<Self::Reader> {
        Err(StorageError::NotFound(artifact.storage_name()))
    }
}

#[test]
fn storage_failure_aborts_upload_without_partial_update() {
    let fixture = Fixture::new();
    let workflow = TaskWorkflow::new(
        SqliteTaskDocumentRepository::try_new(&fixture.conn).unwrap(),
        SqliteProjectRegistry::try_new(&fixture.conn).unwrap(),
        FailingStore,
    );

    let err = workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "draft.pdf"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Storage(_)));

    let repo = SqliteTaskDocumentRepository::try_new(&fixture.conn).unwrap();
    assert!(repo
        .get_by_project(fixture.seed.project_id)
        .unwrap()
        .is_none());
}

#[test]
fn submit_preconditions_name_the_unmet_condition() {
    let fixture = Fixture::new();
    let workflow = fixture.workflow();

    let err = workflow
        .submit_artifact(&fixture.student(), None, SubmitKind::Student)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));

    workflow
        .upload_artifact(
            &fixture.teacher(),
            upload(Slot::TeacherRevision, "revision.pdf"),
        )
        .unwrap();

    let err = workflow
        .submit_artifact(&fixture.student(), None, SubmitKind::Student)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::PreconditionFailed("no draft file uploaded")
    ));

    let err = workflow
        .submit_artifact(&fixture.teacher(), None, SubmitKind::Teacher)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::PreconditionFailed("student draft not submitted yet")
    ));

    let err = workflow
        .submit_artifact(&fixture.student(), None, SubmitKind::Teacher)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));
}

#[test]
fn review_requires_admin_and_teacher_submission() {
    let fixture = Fixture::new();
    let workflow = fixture.workflow();
    let draft = workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "draft.pdf"))
        .unwrap();

    let err = workflow
        .review_task_document(&fixture.teacher(), draft.id, ReviewDecision::Approve)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    let err = workflow
        .review_task_document(&fixture.admin(), draft.id, ReviewDecision::Approve)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::PreconditionFailed("task not submitted by teacher yet")
    ));

    let err = workflow
        .review_task_document(&fixture.admin(), draft.id + 50, ReviewDecision::Return)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
}

#[test]
fn explicit_project_must_include_the_caller() {
    let fixture = Fixture::new();
    fixture
        .conn
        .execute(
            "INSERT INTO users (username, name, role) VALUES ('202101002', 'Other', 'student');",
            [],
        )
        .unwrap();
    let other_student = fixture.conn.last_insert_rowid();
    fixture
        .conn
        .execute(
            "INSERT INTO projects (title, student_id, teacher_id) VALUES ('Other', ?1, ?2);",
            params![other_student, fixture.seed.teacher_id],
        )
        .unwrap();
    let other_project = fixture.conn.last_insert_rowid();
    let workflow = fixture.workflow();

    let err = workflow
        .upload_artifact(
            &fixture.student(),
            UploadRequest {
                project_id: Some(other_project),
                ..upload(Slot::StudentDraft, "draft.pdf")
            },
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    let revision = workflow
        .upload_artifact(
            &fixture.teacher(),
            UploadRequest {
                project_id: Some(other_project),
                ..upload(Slot::TeacherRevision, "revision.pdf")
            },
        )
        .unwrap();
    assert_eq!(revision.project_id, other_project);
}

#[test]
fn download_checks_participants_then_presence() {
    let fixture = Fixture::new();
    let workflow = fixture.workflow();
    let document = workflow
        .upload_artifact(
            &fixture.student(),
            upload(Slot::StudentDraft, "final_task_book.pdf"),
        )
        .unwrap();

    let mut download = workflow
        .open_artifact(&fixture.teacher(), document.id, Slot::StudentDraft)
        .unwrap();
    assert_eq!(download.display_name, "final_task_book.pdf");
    let mut body = Vec::new();
    download.reader.read_to_end(&mut body).unwrap();
    assert_eq!(body, b"document body");

    let outsider = Caller::new(fixture.seed.admin_id + 100, Role::Student);
    let err = workflow
        .open_artifact(&outsider, document.id, Slot::StudentDraft)
        .err()
        .unwrap();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    let err = workflow
        .open_artifact(&fixture.admin(), document.id, Slot::TeacherRevision)
        .err()
        .unwrap();
    assert!(matches!(err, WorkflowError::NotFound(_)));

    for entry in std::fs::read_dir(fixture.uploads.path()).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }
    let err = workflow
        .open_artifact(&fixture.student(), document.id, Slot::StudentDraft)
        .err()
        .unwrap();
    assert!(matches!(err, WorkflowError::NotFound(_)));
}

#[test]
fn task_info_returns_empty_snapshot_before_first_upload() {
    let fixture = Fixture::new();
    let workflow = fixture.workflow();

    let before = workflow.task_info(&fixture.student(), None).unwrap();
    assert_eq!(before.id, None);
    assert_eq!(before.project_id, Some(fixture.seed.project_id));
    assert!(!before.student_submitted);

    let admin_view = workflow.task_info(&fixture.admin(), None).unwrap();
    assert_eq!(admin_view.project_id, None);

    let uploaded = workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "draft.pdf"))
        .unwrap();
    let after = workflow
        .task_info(&fixture.teacher(), None)
        .unwrap();
    assert_eq!(after.id, Some(uploaded.id));
    assert_eq!(after.student_draft_path, uploaded.student_draft);
    assert_eq!(after.teacher_name.as_deref(), Some("Demo Teacher"));

    let explicit = workflow
        .task_info(&fixture.admin(), Some(fixture.seed.project_id))
        .unwrap();
    assert_eq!(explicit, after);
}

#[test]
fn admin_queue_lists_exactly_the_documents_that_reached_it() {
    let fixture = Fixture::new();
    let workflow = fixture.workflow();
    let repo = SqliteTaskDocumentRepository::try_new(&fixture.conn).unwrap();

    let draft = workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "draft.pdf"))
        .unwrap();
    assert!(!draft.is_in_admin_queue());
    assert!(workflow.list_pending(&fixture.admin()).unwrap().is_empty());

    let document_id = reach_awaiting_admin(&fixture);
    let stored = repo.get(document_id).unwrap().unwrap();
    assert!(stored.is_in_admin_queue());
    let pending = workflow.list_pending(&fixture.admin()).unwrap();
    assert_eq!(pending, vec![stored]);
    assert!(pending.iter().all(TaskDocument::is_in_admin_queue));

    let returned = workflow
        .review_task_document(&fixture.admin(), document_id, ReviewDecision::Return)
        .unwrap();
    assert!(!returned.teacher_submitted);
    assert!(returned.is_in_admin_queue());
    assert_eq!(workflow.list_pending(&fixture.admin()).unwrap(), vec![returned]);

    let reset = workflow
        .reset_task_document(&fixture.admin(), document_id)
        .unwrap();
    assert!(!reset.is_in_admin_queue());
    assert!(workflow.list_pending(&fixture.admin()).unwrap().is_empty());
}

#[test]
fn updated_at_tracks_each_write_in_milliseconds() {
    fn now_ms() -> i64 {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap();
        i64::try_from(elapsed.as_millis()).unwrap()
    }

    let fixture = Fixture::new();
    let workflow = fixture.workflow();

    let before = now_ms();
    let uploaded = workflow
        .upload_artifact(&fixture.student(), upload(Slot::StudentDraft, "draft.pdf"))
        .unwrap();
    let after = now_ms();
    // SQLite truncates its clock to whole milliseconds.
    assert!(
        (before - 1..=after + 1).contains(&uploaded.updated_at),
        "updated_at={} outside [{before}, {after}]",
        uploaded.updated_at
    );

    std::thread::sleep(std::time::Duration::from_millis(5));
    let submitted = workflow
        .submit_artifact(&fixture.student(), None, SubmitKind::Student)
        .unwrap();
    assert!(submitted.updated_at > uploaded.updated_at);
}
