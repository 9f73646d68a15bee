//! Error types for catalog operations.

use std::fmt;

use thiserror::Error;

/// Structured classification for catalog/database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogDbErrorKind {
    /// `SQLite` returned busy/locked; another process holds the write lock.
    BusyOrLocked,
    /// Constraint failure (unique/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Expected row was not found.
    RowNotFound,
    /// Filesystem failure underneath the store (disk full, permissions).
    Io,
    /// Unclassified database failure.
    Other,
}

impl CatalogDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for CatalogDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> CatalogDbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return CatalogDbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return CatalogDbErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked") || message.contains("database is busy") {
        return CatalogDbErrorKind::BusyOrLocked;
    }
    if message.contains("disk is full") || message.contains("disk i/o error") {
        return CatalogDbErrorKind::Io;
    }

    CatalogDbErrorKind::Other
}

/// Errors that can occur during catalog operations.
///
/// Every variant is fatal to the run that hit it: the catalog is the single
/// source of truth, so a failed write cannot be skipped.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Database operation failed.
    #[error("catalog database error ({kind}): {message}")]
    Database {
        /// Typed classification used for failure handling.
        kind: CatalogDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// Manual item not found.
    #[error(
        "manual item not found: id {0}\n  Suggestion: The catalog may have been cleared while this run was active"
    )]
    ItemNotFound(i64),

    /// Collection not found.
    #[error(
        "collection not found: id {0}\n  Suggestion: Re-run discovery for this source to repopulate collections"
    )]
    CollectionNotFound(i64),

    /// A stored value could not be decoded.
    #[error("invalid catalog value in {field}: {reason}")]
    InvalidValue {
        /// Column or field name.
        field: &'static str,
        /// Why it is invalid.
        reason: String,
    },
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: CatalogDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl CatalogError {
    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<CatalogDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::ItemNotFound(_) | Self::CollectionNotFound(_) | Self::InvalidValue { .. } => {
                None
            }
        }
    }

    /// Returns true when this error is a database busy/locked condition.
    #[must_use]
    pub fn is_busy_or_locked(&self) -> bool {
        self.database_kind() == Some(CatalogDbErrorKind::BusyOrLocked)
    }
}
