//! Error taxonomy.
//!
//! [`ServiceError`] is what every action returns on failure. Port failures
//! ([`StoreError`], [`AuthError`]) are defined here as well so the engine can
//! classify them without string matching.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::DenyReason;

/// Coarse failure class surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    InvalidInput,
    Unavailable,
    Internal,
}

impl ErrorKind {
    /// HTTP-style status code for this kind.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Unavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "unauthenticated" => Ok(ErrorKind::Unauthenticated),
            "forbidden" => Ok(ErrorKind::Forbidden),
            "not_found" | "notfound" => Ok(ErrorKind::NotFound),
            "conflict" => Ok(ErrorKind::Conflict),
            "invalid_input" | "invalid" => Ok(ErrorKind::InvalidInput),
            "unavailable" => Ok(ErrorKind::Unavailable),
            "internal" => Ok(ErrorKind::Internal),
            other => Err(format!("unknown error kind: {other}")),
        }
    }
}

/// Uniqueness rules a store must enforce atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conflict {
    /// A learner already has an active attempt on the test.
    ActiveAttempt,
    /// The course already has a test with this title.
    DuplicateTitle,
    /// The test has attempts, so its questions are frozen.
    StructureLocked,
}

impl Conflict {
    pub fn reason(self) -> &'static str {
        match self {
            Conflict::ActiveAttempt => "active_attempt_exists",
            Conflict::DuplicateTitle => "duplicate_test_title",
            Conflict::StructureLocked => "test_structure_locked",
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::ActiveAttempt => write!(f, "an active attempt already exists"),
            Conflict::DuplicateTitle => write!(f, "a test with this title already exists"),
            Conflict::StructureLocked => write!(f, "test cannot be changed once attempts exist"),
        }
    }
}

/// Errors returned by storage ports.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The call did not finish within the configured deadline.
    #[error("store call timed out after {0}ms")]
    Timeout(u64),

    /// A uniqueness guard rejected the write.
    #[error("uniqueness violation: {0}")]
    Duplicate(Conflict),

    /// The backend failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` if the caller may safely retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}

/// Errors returned by a `PrincipalResolver`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid or expired credential")]
    InvalidCredential,

    #[error("resolver backend error: {0}")]
    Backend(String),
}

/// Failure of an examgate action.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(DenyReason),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("test {0} is not active")]
    TestNotActive(String),

    #[error("conflict: {0}")]
    Conflict(Conflict),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store unavailable, retry later: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::NotFound { .. } | ServiceError::TestNotActive(_) => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServiceError::Unavailable(_) => ErrorKind::Unavailable,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> u16 {
        self.kind().status()
    }

    /// Short machine-parseable reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            ServiceError::Unauthenticated(_) => "unauthenticated",
            ServiceError::Forbidden(deny) => deny.code(),
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::TestNotActive(_) => "test_not_active",
            ServiceError::Conflict(c) => c.reason(),
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::Unavailable(_) => "store_timeout",
            ServiceError::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_))
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(ms) => {
                ServiceError::Unavailable(format!("store call timed out after {ms}ms"))
            }
            StoreError::Duplicate(conflict) => ServiceError::Conflict(conflict),
            StoreError::Backend(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Backend(msg) => ServiceError::Internal(msg),
            other => ServiceError::Unauthenticated(other.to_string()),
        }
    }
}
