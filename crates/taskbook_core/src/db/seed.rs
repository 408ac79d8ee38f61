//! Demo data for empty databases.

use super::DbResult;
use crate::model::actor::{ProjectId, UserId};
use log::info;
use rusqlite::{params, Connection, TransactionBehavior};

/// Ids created by [`seed_demo_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoSeed {
    pub student_id: UserId,
    pub teacher_id: UserId,
    pub admin_id: UserId,
    pub project_id: ProjectId,
}

/// Inserts one student, one teacher, one admin and their project.
///
/// Returns `None` without writing when any user already exists.
pub fn seed_demo_data(conn: &mut Connection) -> DbResult<Option<DemoSeed>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let has_users: i64 = tx.query_row("SELECT EXISTS(SELECT 1 FROM users);", [], |row| {
        row.get(0)
    })?;
    if has_users == 1 {
        return Ok(None);
    }

    let insert_user = |username: &str, name: &str, role: &str| -> DbResult<UserId> {
        tx.execute(
            "INSERT INTO users (username, name, role) VALUES (?1, ?2, ?3);",
            params![username, name, role],
        )?;
        Ok(tx.last_insert_rowid())
    };
    let student_id = insert_user("202101001", "Demo Student", "student")?;
    let teacher_id = insert_user("T1001", "Demo Teacher", "teacher")?;
    let admin_id = insert_user("admin", "Academic Office", "admin")?;

    tx.execute(
        "INSERT INTO projects (title, student_id, teacher_id) VALUES (?1, ?2, ?3);",
        params![
            "Image recognition with deep learning",
            student_id,
            teacher_id
        ],
    )?;
    let project_id = tx.last_insert_rowid();
    tx.commit()?;

    info!(
        "event=seed_demo module=db status=ok project_id={project_id} student_id={student_id} teacher_id={teacher_id} admin_id={admin_id}"
    );
    Ok(Some(DemoSeed {
        student_id,
        teacher_id,
        admin_id,
        project_id,
    }))
}
