use thiserror::Error;

/// Failure of a repository or credential operation.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Blocked(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("operation not permitted for this session")]
    Forbidden,

    #[error("password must be changed before continuing")]
    RotationRequired,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl RepoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RepoError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        RepoError::Conflict(msg.into())
    }

    /// Stable code reported to the front end.
    pub fn code(&self) -> &'static str {
        match self {
            RepoError::Validation(_) => "bad_params",
            RepoError::Conflict(_) => "conflict",
            RepoError::NotFound(_) => "not_found",
            RepoError::Blocked(_) => "blocked",
            RepoError::InvalidCredentials => "invalid_credentials",
            RepoError::Forbidden => "forbidden",
            RepoError::RotationRequired => "password_rotation_required",
            RepoError::Hash(_) => "hash_failed",
            RepoError::Storage(_) => "db_error",
        }
    }
}

pub type RepoResult<T> = std::result::Result<T, RepoError>;
