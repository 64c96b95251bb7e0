use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use super::{students, teachers};
use crate::auth::{Role, Session};
use crate::error::{RepoError, RepoResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfile {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub must_rotate: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Profile {
    Admin(AdminProfile),
    Teacher(teachers::Teacher),
    Student(students::Student),
}

/// The session's own record. Administrators can read theirs before a
/// forced password rotation.
pub fn own(conn: &Connection, session: &Session) -> RepoResult<Profile> {
    match session.role {
        Role::Admin => {
            let row = conn
                .query_row(
                    "SELECT id, username, email, must_rotate FROM admin WHERE id = ?",
                    [session.user_id],
                    |r| {
                        Ok(AdminProfile {
                            id: r.get(0)?,
                            username: r.get(1)?,
                            email: r.get(2)?,
                            must_rotate: r.get::<_, i64>(3)? != 0,
                        })
                    },
                )
                .optional()?;
            row.map(Profile::Admin).ok_or(RepoError::NotFound("account"))
        }
        Role::Teacher => teachers::get(conn, session, session.user_id).map(Profile::Teacher),
        Role::Student => students::get(conn, session, session.user_id).map(Profile::Student),
    }
}
