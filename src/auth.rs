//! Credential verification and the session value every repository call
//! is scoped by.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, info, instrument, warn};

use crate::config::{AuthConfig, HashScheme};
use crate::error::{RepoError, RepoResult};

pub const MIN_SECRET_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    /// Table holding this role's identities and the column that identifies
    /// a login.
    fn credential_source(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Role::Admin => ("admin", "username", "username"),
            Role::Teacher => ("teachers", "teacher_id", "name"),
            Role::Student => ("students", "student_id", "name"),
        }
    }
}

impl FromStr for Role {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            _ => Err(RepoError::validation(
                "role must be one of admin, teacher, student",
            )),
        }
    }
}

/// Authenticated identity. Passed explicitly to every repository call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub role: Role,
    pub user_id: i64,
    pub display_name: String,
    pub must_rotate: bool,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> RepoResult<()> {
        if self.role != Role::Admin {
            return Err(RepoError::Forbidden);
        }
        self.require_rotated()
    }

    pub fn require_rotated(&self) -> RepoResult<()> {
        if self.must_rotate {
            return Err(RepoError::RotationRequired);
        }
        Ok(())
    }
}

pub fn legacy_sha256_hex(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn is_legacy_hash(stored: &str) -> bool {
    stored.len() == 64 && stored.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn hash_secret(secret: &str, scheme: HashScheme) -> RepoResult<String> {
    match scheme {
        HashScheme::LegacySha256 => Ok(legacy_sha256_hex(secret)),
        HashScheme::Argon2 => {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(secret.as_bytes(), &salt)
                .map(|h| h.to_string())
                .map_err(|e| RepoError::Hash(e.to_string()))
        }
    }
}

/// Accepts both PHC strings and the unsalted hex digests written by the
/// desktop application.
pub fn verify_secret(secret: &str, stored: &str) -> bool {
    if is_legacy_hash(stored) {
        return legacy_sha256_hex(secret).eq_ignore_ascii_case(stored);
    }
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "stored password hash is not parseable");
            false
        }
    }
}

pub fn validate_new_secret(secret: &str) -> RepoResult<()> {
    if secret.chars().count() < MIN_SECRET_LEN {
        return Err(RepoError::validation(format!(
            "password must be at least {} characters",
            MIN_SECRET_LEN
        )));
    }
    Ok(())
}

/// Hash checked when no account matches, so an unknown identifier costs
/// the same verification work as a wrong password.
fn unknown_identity_hash(scheme: HashScheme) -> Option<String> {
    const PLACEHOLDER: &str = "registrar-unknown-identity";
    static ARGON2: OnceLock<Option<String>> = OnceLock::new();
    match scheme {
        HashScheme::LegacySha256 => Some(legacy_sha256_hex(PLACEHOLDER)),
        HashScheme::Argon2 => ARGON2
            .get_or_init(|| hash_secret(PLACEHOLDER, HashScheme::Argon2).ok())
            .clone(),
    }
}

struct CredentialRow {
    id: i64,
    display_name: String,
    password_hash: String,
    must_rotate: bool,
}

fn load_credentials(
    conn: &Connection,
    role: Role,
    identifier: &str,
) -> RepoResult<Option<CredentialRow>> {
    let (table, id_col, name_col) = role.credential_source();
    let rotate_col = if role == Role::Admin { "must_rotate" } else { "0" };
    let sql = format!(
        "SELECT id, {name_col}, password_hash, {rotate_col} FROM {table} WHERE {id_col} = ?"
    );
    let row = conn
        .query_row(&sql, [identifier], |r| {
            Ok(CredentialRow {
                id: r.get(0)?,
                display_name: r.get(1)?,
                password_hash: r.get(2)?,
                must_rotate: r.get::<_, i64>(3)? != 0,
            })
        })
        .optional()?;
    Ok(row)
}

fn store_hash(conn: &Connection, role: Role, user_id: i64, hash: &str) -> RepoResult<()> {
    let (table, _, _) = role.credential_source();
    let sql = format!("UPDATE {table} SET password_hash = ? WHERE id = ?");
    conn.execute(&sql, (hash, user_id))?;
    Ok(())
}

/// Verifies `secret` for the identity `identifier` of `role`. Every kind of
/// mismatch is reported as the same `InvalidCredentials`.
#[instrument(skip(conn, secret, cfg), fields(role = role.as_str()))]
pub fn authenticate(
    conn: &Connection,
    cfg: &AuthConfig,
    role: Role,
    identifier: &str,
    secret: &str,
) -> RepoResult<Session> {
    let identifier = identifier.trim();
    if identifier.is_empty() || secret.is_empty() {
        return Err(RepoError::validation("identifier and password are required"));
    }

    let Some(row) = load_credentials(conn, role, identifier)? else {
        if let Some(hash) = unknown_identity_hash(cfg.hash_scheme) {
            let _ = verify_secret(secret, &hash);
        }
        debug!("login failed");
        return Err(RepoError::InvalidCredentials);
    };
    if !verify_secret(secret, &row.password_hash) {
        debug!("login failed");
        return Err(RepoError::InvalidCredentials);
    }

    if is_legacy_hash(&row.password_hash)
        && cfg.upgrade_legacy_hashes
        && cfg.hash_scheme == HashScheme::Argon2
    {
        let upgraded = hash_secret(secret, HashScheme::Argon2)?;
        store_hash(conn, role, row.id, &upgraded)?;
        info!(user_id = row.id, "upgraded legacy password hash");
    }

    info!(user_id = row.id, "login succeeded");
    Ok(Session {
        role,
        user_id: row.id,
        display_name: row.display_name,
        must_rotate: row.must_rotate,
    })
}

/// Changes the session's own password after re-verifying the current one.
#[instrument(skip(conn, cfg, current, new_secret), fields(role = session.role.as_str(), user_id = session.user_id))]
pub fn change_password(
    conn: &Connection,
    cfg: &AuthConfig,
    session: &Session,
    current: &str,
    new_secret: &str,
) -> RepoResult<()> {
    validate_new_secret(new_secret)?;
    let (table, _, _) = session.role.credential_source();
    let sql = format!("SELECT password_hash FROM {table} WHERE id = ?");
    let stored: Option<String> = conn
        .query_row(&sql, [session.user_id], |r| r.get(0))
        .optional()?;
    let Some(stored) = stored else {
        return Err(RepoError::NotFound("account"));
    };
    if !verify_secret(current, &stored) {
        return Err(RepoError::InvalidCredentials);
    }
    if current == new_secret && session.must_rotate {
        return Err(RepoError::validation(
            "new password must differ from the current one",
        ));
    }

    let hash = hash_secret(new_secret, cfg.hash_scheme)?;
    store_hash(conn, session.role, session.user_id, &hash)?;
    if session.role == Role::Admin {
        conn.execute(
            "UPDATE admin SET must_rotate = 0 WHERE id = ?",
            [session.user_id],
        )?;
    }
    info!("password changed");
    Ok(())
}
