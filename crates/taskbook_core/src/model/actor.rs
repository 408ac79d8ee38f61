//! Actor and project records supplied by external collaborators.
//!
//! # Responsibility
//! - Define caller identity passed into every workflow operation.
//! - Define the project pairing used to resolve "my project".

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type UserId = i64;
pub type ProjectId = i64;

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Stable string id used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }
}

/// Parse error for persisted or wire role values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl Display for UnknownRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role `{}`", self.0)
    }
}

impl Error for UnknownRole {}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Authenticated caller, resolved by the actor directory.
///
/// Passed explicitly into every engine operation instead of being read from
/// request-global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}

/// Student/teacher pairing that owns at most one task document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub student_id: Option<UserId>,
    pub teacher_id: Option<UserId>,
    /// Display name joined from the actor directory.
    pub student_name: Option<String>,
    /// Display name joined from the actor directory.
    pub teacher_name: Option<String>,
}

impl Project {
    /// Returns whether `caller` is the project's student, its teacher, or an admin.
    pub fn admits(&self, caller: &Caller) -> bool {
        match caller.role {
            Role::Student => self.student_id == Some(caller.id),
            Role::Teacher => self.teacher_id == Some(caller.id),
            Role::Admin => true,
        }
    }
}
