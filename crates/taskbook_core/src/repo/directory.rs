//! Actor directory and project registry contracts.
//!
//! # Responsibility
//! - Resolve opaque caller ids to an authenticated `Caller`.
//! - Resolve projects explicitly or by participant.
//!
//! # Invariants
//! - Both collaborators are read-only from the workflow's point of view.
//! - Admins participate in no project; participant lookup returns `None`.

use crate::model::actor::{Caller, Project, ProjectId, Role, UserId};
use crate::repo::{table_exists, RepoError, RepoResult};
use rusqlite::{Connection, OptionalExtension, Row};

const PROJECT_SELECT_SQL: &str = "SELECT
    p.id,
    p.title,
    p.student_id,
    p.teacher_id,
    s.name AS student_name,
    t.name AS teacher_name
FROM projects p
LEFT JOIN users s ON s.id = p.student_id
LEFT JOIN users t ON t.id = p.teacher_id";

/// Resolves opaque caller identities.
pub trait ActorDirectory {
    /// Returns `None` when the id is malformed or unknown.
    fn resolve_caller(&self, opaque_id: &str) -> RepoResult<Option<Caller>>;
}

/// Resolves project pairings.
pub trait ProjectRegistry {
    fn find_project_by_participant(
        &self,
        user_id: UserId,
        role: Role,
    ) -> RepoResult<Option<Project>>;
    fn get_project(&self, project_id: ProjectId) -> RepoResult<Option<Project>>;
}

/// `users` table backed directory.
pub struct SqliteActorDirectory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActorDirectory<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        if !table_exists(conn, "users")? {
            return Err(RepoError::MissingRequiredTable("users"));
        }
        Ok(Self { conn })
    }
}

impl ActorDirectory for SqliteActorDirectory<'_> {
    fn resolve_caller(&self, opaque_id: &str) -> RepoResult<Option<Caller>> {
        let Ok(user_id) = opaque_id.trim().parse::<UserId>() else {
            return Ok(None);
        };

        let role_text = self
            .conn
            .query_row("SELECT role FROM users WHERE id = ?1;", [user_id], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;

        match role_text {
            Some(value) => {
                let role = value.parse::<Role>().map_err(|err| {
                    RepoError::InvalidData(format!("{err} in users.role for user {user_id}"))
                })?;
                Ok(Some(Caller::new(user_id, role)))
            }
            None => Ok(None),
        }
    }
}

/// `projects` table backed registry.
pub struct SqliteProjectRegistry<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRegistry<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        if !table_exists(conn, "projects")? {
            return Err(RepoError::MissingRequiredTable("projects"));
        }
        Ok(Self { conn })
    }
}

impl ProjectRegistry for SqliteProjectRegistry<'_> {
    fn find_project_by_participant(
        &self,
        user_id: UserId,
        role: Role,
    ) -> RepoResult<Option<Project>> {
        let column = match role {
            Role::Student => "student_id",
            Role::Teacher => "teacher_id",
            Role::Admin => return Ok(None),
        };
        let project = self
            .conn
            .query_row(
                &format!("{PROJECT_SELECT_SQL} WHERE p.{column} = ?1 ORDER BY p.id ASC LIMIT 1;"),
                [user_id],
                parse_project_row,
            )
            .optional()?;
        Ok(project)
    }

    fn get_project(&self, project_id: ProjectId) -> RepoResult<Option<Project>> {
        let project = self
            .conn
            .query_row(
                &format!("{PROJECT_SELECT_SQL} WHERE p.id = ?1;"),
                [project_id],
                parse_project_row,
            )
            .optional()?;
        Ok(project)
    }
}

fn parse_project_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        title: row.get("title")?,
        student_id: row.get("student_id")?,
        teacher_id: row.get("teacher_id")?,
        student_name: row.get("student_name")?,
        teacher_name: row.get("teacher_name")?,
    })
}
